//! Path utilities: wildcard counting and lexical path cleaning.

/// Count the wildcard segments (`:name` and `*name`) in a route pattern.
pub fn count_params(pattern: &str) -> u16 {
    let n = pattern
        .bytes()
        .filter(|&b| b == b':' || b == b'*')
        .count();
    n.min(u16::MAX as usize) as u16
}

/// Lexically clean a request path.
///
/// Collapses `//`, resolves `.` and `..` elements, guarantees a leading `/`
/// and preserves a trailing `/` only when the input had one. Used by the
/// case-insensitive redirect fallback; registered patterns are never cleaned.
pub fn clean_path(p: &str) -> String {
    if p.is_empty() {
        return "/".to_string();
    }

    let bytes = p.as_bytes();
    let n = bytes.len();
    let mut out: Vec<u8> = Vec::with_capacity(n + 1);
    out.push(b'/');

    let mut r = usize::from(bytes[0] == b'/');
    let mut trailing = n > 1 && bytes[n - 1] == b'/';

    while r < n {
        if bytes[r] == b'/' {
            // empty path element
            r += 1;
        } else if bytes[r] == b'.' && r + 1 == n {
            trailing = true;
            r += 1;
        } else if bytes[r] == b'.' && bytes[r + 1] == b'/' {
            // . element
            r += 2;
        } else if bytes[r] == b'.' && bytes[r + 1] == b'.' && (r + 2 == n || bytes[r + 2] == b'/') {
            // .. element: drop the last path element
            r += 3;
            while out.len() > 1 && out.pop() != Some(b'/') {}
        } else {
            if out.len() > 1 {
                out.push(b'/');
            }
            while r < n && bytes[r] != b'/' {
                out.push(bytes[r]);
                r += 1;
            }
        }
    }

    if trailing && out.len() > 1 {
        out.push(b'/');
    }

    // only whole ASCII-delimited chunks were moved, so the bytes stay valid
    String::from_utf8(out).expect("clean_path preserved utf-8")
}
