/// Extract the tenant key from a request host.
///
/// The configured server domain must be a proper dot-suffix of the host.
/// Both dotted (`app.alice.example.com`) and dashed
/// (`filebrowser-alice.example.com`) subdomain conventions are accepted; in
/// either case the tenant is the rightmost word of the last label before the
/// server domain.
pub fn extract_tenant(raw_host: &str, server_domain: &str) -> Option<String> {
    let host = strip_port(raw_host).to_ascii_lowercase();
    let suffix = format!(".{}", server_domain.to_ascii_lowercase());

    // The bare server domain carries no tenant; neither does any host that
    // does not sit strictly under it.
    let prefix = host.strip_suffix(&suffix)?;
    if prefix.is_empty() {
        return None;
    }

    let last_label = prefix.rsplit('.').next()?;
    let tenant = match last_label.rfind('-') {
        Some(idx) => &last_label[idx + 1..],
        None => last_label,
    };

    if tenant.is_empty() {
        None
    } else {
        Some(tenant.to_string())
    }
}

/// Drop a trailing `:port` from a Host header value. Unbracketed IPv6
/// literals are left alone by the digit check; they can never match a
/// domain suffix anyway.
fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}
