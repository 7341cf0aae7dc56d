/// Key layout and encoding utilities for Fjall partitions
///
/// Partition structure:
/// - `attempts`: attempt:{timestamp_micros:020}:{seq:016} -> ExportAttemptRecord (JSON)
/// - `schedule`: schedule:active -> ScheduleConfig (JSON)
/// - `metadata`: meta:{key} -> value (string)
///
/// Attempt keys are zero padded so byte order equals time order, with the
/// sequence number breaking ties between records written in the same
/// microsecond.

pub const ATTEMPT_PREFIX: &str = "attempt:";
pub const ACTIVE_SCHEDULE_KEY: &[u8] = b"schedule:active";

/// Encode an attempt key: attempt:{timestamp_micros:020}:{seq:016}
pub fn encode_attempt_key(timestamp_micros: u64, seq: u64) -> Vec<u8> {
    format!("{ATTEMPT_PREFIX}{timestamp_micros:020}:{seq:016}").into_bytes()
}

/// Decode an attempt key -> (timestamp_micros, seq)
pub fn decode_attempt_key(key: &[u8]) -> Option<(u64, u64)> {
    let key_str = std::str::from_utf8(key).ok()?;
    let (timestamp, seq) = key_str.strip_prefix(ATTEMPT_PREFIX)?.split_once(':')?;
    Some((timestamp.parse().ok()?, seq.parse().ok()?))
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}
