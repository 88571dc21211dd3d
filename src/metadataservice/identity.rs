/// `<prefix>-<last dot-separated segment of the address>`
pub fn resolve_hostname(address: &str, prefix: &str) -> String {
    let last_segment = address.rsplit('.').next().unwrap_or(address);
    format!("{prefix}-{last_segment}")
}

/// The instance id embeds the whole address, not only its last segment
pub fn resolve_instance_id(address: &str) -> String {
    format!("i-{address}")
}
