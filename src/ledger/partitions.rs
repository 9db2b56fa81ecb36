/// Key layout for Fjall partitions
///
/// Partition structure:
/// - `images`: task:{task_id} -> ImageRecord (JSON)

/// Encode a task key: task:{task_id}
pub fn encode_task_key(task_id: &str) -> Vec<u8> {
    format!("task:{}", task_id).into_bytes()
}

/// Decode a task key: task:{task_id} -> task_id
pub fn decode_task_key(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("task:").map(String::from)
}
