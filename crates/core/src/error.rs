use thiserror::Error;

use crate::bank::BankError;
use crate::model::{ConfigError, ItemError, SummaryError};
use crate::timer::TimerError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Item(#[from] ItemError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Bank(#[from] BankError),
    #[error(transparent)]
    Summary(#[from] SummaryError),
    #[error(transparent)]
    Timer(#[from] TimerError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ItemId, SessionConfigDraft};

    fn validate_all() -> Result<(), Error> {
        SessionConfigDraft {
            pass_threshold: 140,
            ..SessionConfigDraft::default()
        }
        .validate()?;
        Ok(())
    }

    #[test]
    fn layer_errors_convert_transparently() {
        let err = validate_all().unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::PassThresholdOutOfRange(140))));

        let err: Error = BankError::DuplicateItem(ItemId::new(4)).into();
        assert_eq!(err.to_string(), "duplicate item id in question bank: 4");
    }
}
