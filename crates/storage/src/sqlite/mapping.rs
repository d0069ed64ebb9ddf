use assess_core::model::{CompletionReason, ItemId, Outcome, SessionId, SessionMode};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn u8_from_i64(field: &'static str, v: i64) -> Result<u8, StorageError> {
    u8::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn item_id_from_i64(v: i64) -> Result<ItemId, StorageError> {
    u64::try_from(v)
        .map(ItemId::new)
        .map_err(|_| StorageError::Serialization("item_id sign overflow".into()))
}

pub(crate) fn session_id_from_str(s: &str) -> Result<SessionId, StorageError> {
    s.parse::<SessionId>().map_err(ser)
}

pub(crate) fn parse_mode(s: &str) -> Result<SessionMode, StorageError> {
    SessionMode::parse(s).ok_or_else(|| StorageError::Serialization(format!("invalid mode: {s}")))
}

pub(crate) fn parse_reason(s: &str) -> Result<CompletionReason, StorageError> {
    CompletionReason::parse(s)
        .ok_or_else(|| StorageError::Serialization(format!("invalid completion reason: {s}")))
}

pub(crate) fn parse_outcome(s: &str) -> Result<Outcome, StorageError> {
    Outcome::parse(s).map_err(ser)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_parsers() {
        assert_eq!(
            parse_mode(SessionMode::SelfPacedPractice.as_str()).unwrap(),
            SessionMode::SelfPacedPractice
        );
        assert_eq!(
            parse_reason(CompletionReason::TimeExpired.as_str()).unwrap(),
            CompletionReason::TimeExpired
        );
        assert_eq!(parse_outcome("skipped").unwrap(), Outcome::Skipped);
    }

    #[test]
    fn bad_values_become_serialization_errors() {
        assert!(matches!(parse_mode("exam"), Err(StorageError::Serialization(_))));
        assert!(matches!(item_id_from_i64(-1), Err(StorageError::Serialization(_))));
        assert!(matches!(u8_from_i64("percentage", 300), Err(StorageError::Serialization(_))));
        assert!(id_i64("item_id", u64::MAX).is_err());
    }
}
