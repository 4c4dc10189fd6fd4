use std::fmt;

/// A key or token handed out by the cloud.  `Debug` never shows the value, so secrets can sit in
/// structs that get trace-logged.
#[derive(Clone, PartialEq, Eq)]
pub(crate) struct Secret(String);

impl Secret {
    pub(crate) fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    pub(crate) fn expose(&self) -> &str {
        &self.0
    }

    /// Something safe to print: the last four characters, or nothing for short values.
    pub(crate) fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            "****".to_string()
        } else {
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("****{}", tail)
        }
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

/// Converts `bytes` to a `String` if it is a UTF-8 encoded string.
/// Truncates the string if it is too long for printing.
pub(crate) fn printable_string(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) if s.len() < 2048 => s.to_string(),
        Ok(s) => {
            let mut end = 2034;
            while !s.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}<truncated...>", &s[..end])
        }
        Err(_) => "<binary>".to_string(),
    }
}
