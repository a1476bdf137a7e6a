use crate::domain::Money;

/// One row of a wallet journal.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    TopUp {
        account: String,
        amount: Money,
        description: String,
    },
    Reserve {
        account: String,
        external_id: String,
        amount: Money,
        transaction_type: String,
    },
    Delivery {
        external_id: String,
        state: String,
    },
}

impl core::fmt::Display for Command {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Command::TopUp {
                account, amount, ..
            } => write!(f, "top_up,account={},amount={}", account, amount),
            Command::Reserve {
                account,
                external_id,
                amount,
                transaction_type,
            } => write!(
                f,
                "reserve,account={},ref={},amount={},type={}",
                account, external_id, amount, transaction_type
            ),
            Command::Delivery { external_id, state } => {
                write!(f, "delivery,ref={},state={}", external_id, state)
            }
        }
    }
}
