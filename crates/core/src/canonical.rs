//! Canonical URL form. All page identity flows through `normalize`:
//! two URLs are the same page iff their canonical forms are byte-equal.

use url::Url;

use crate::error::CrawlError;

/// Query parameters dropped during normalization. `utm_*` is matched by
/// prefix; everything else exactly. Extending this list requires no other
/// code changes.
pub const TRACKING_PARAMS: &[&str] = &[
    "fbclid",
    "gclid",
    "msclkid",
    "mc_cid",
    "mc_eid",
    "_ga",
    "_gl",
    "gad_source",
    "ref",
    "campaignid",
    "adgroupid",
];

pub fn is_tracking_param(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.starts_with("utm_") || TRACKING_PARAMS.contains(&lower.as_str())
}

/// Deterministic canonical form: scheme required (https assumed when
/// missing), host lowercased, fragment stripped, tracking params dropped,
/// remaining query pairs sorted, trailing slash stripped except on the
/// root path. Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> Result<String, CrawlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CrawlError::InvalidUrl("empty URL".into()));
    }

    // Parse as-is first; inserting https:// in front of an input that
    // already has a scheme (mailto:, tel:) would smuggle it through as
    // userinfo.
    let mut parsed = match Url::parse(trimmed) {
        Ok(url) => url,
        // Schemeless input gets https; anything that already carried a
        // scheme and still failed is genuinely malformed.
        Err(_) if !trimmed.contains("://") => {
            let with_scheme = if trimmed.starts_with("//") {
                format!("https:{trimmed}")
            } else {
                format!("https://{trimmed}")
            };
            Url::parse(&with_scheme)
                .map_err(|e| CrawlError::InvalidUrl(format!("{raw}: {e}")))?
        }
        Err(e) => return Err(CrawlError::InvalidUrl(format!("{raw}: {e}"))),
    };

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(CrawlError::InvalidUrl(format!(
                "{raw}: unsupported scheme {other}"
            )))
        }
    }
    if parsed.host_str().is_none() {
        return Err(CrawlError::InvalidUrl(format!("{raw}: no host")));
    }

    parsed.set_fragment(None);

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        pairs.sort();
        let mut qp = parsed.query_pairs_mut();
        qp.clear();
        for (k, v) in &pairs {
            qp.append_pair(k, v);
        }
        drop(qp);
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }

    Ok(parsed.to_string())
}

/// Lowercased host of a URL, with scheme insertion as in `normalize`.
pub fn domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let parsed = match Url::parse(trimmed) {
        Ok(url) => url,
        Err(_) if !trimmed.contains("://") => {
            Url::parse(&format!("https://{trimmed}")).ok()?
        }
        Err(_) => return None,
    };
    parsed.host_str().map(|h| h.to_ascii_lowercase())
}

/// Resolve a possibly-relative href against a base page URL and normalize.
pub fn resolve(rel: &str, base: &Url) -> Result<String, CrawlError> {
    let joined = base
        .join(rel)
        .map_err(|e| CrawlError::InvalidUrl(format!("{rel}: {e}")))?;
    normalize(joined.as_str())
}

pub fn is_valid(raw: &str) -> bool {
    normalize(raw).is_ok()
}

/// Same page iff canonical forms are byte-equal.
pub fn equivalent(a: &str, b: &str) -> bool {
    match (normalize(a), normalize(b)) {
        (Ok(na), Ok(nb)) => na == nb,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent() {
        let inputs = [
            "https://Example.COM/Path/?b=2&a=1&utm_source=x#frag",
            "example.com/page/",
            "http://example.com/?fbclid=abc",
            "https://example.com",
        ];
        for input in inputs {
            let once = normalize(input).unwrap();
            let twice = normalize(&once).unwrap();
            assert_eq!(once, twice, "not idempotent for {input}");
        }
    }

    #[test]
    fn equivalence_classes_collapse() {
        let canon = normalize("https://example.com/a?x=1").unwrap();
        assert_eq!(normalize("https://EXAMPLE.com/a?x=1#top").unwrap(), canon);
        assert_eq!(
            normalize("https://example.com/a/?x=1&utm_campaign=spring").unwrap(),
            canon
        );
        assert_eq!(
            normalize("https://example.com/a?utm_source=s&x=1&gclid=123").unwrap(),
            canon
        );
    }

    #[test]
    fn query_pairs_sorted() {
        assert_eq!(
            normalize("https://example.com/p?z=1&a=2&m=3").unwrap(),
            "https://example.com/p?a=2&m=3&z=1"
        );
    }

    #[test]
    fn root_slash_kept_other_trailing_stripped() {
        assert_eq!(normalize("https://example.com/").unwrap(), "https://example.com/");
        assert_eq!(
            normalize("https://example.com/about/").unwrap(),
            "https://example.com/about"
        );
    }

    #[test]
    fn scheme_inserted_when_missing() {
        assert_eq!(
            normalize("example.com/page").unwrap(),
            "https://example.com/page"
        );
    }

    #[test]
    fn rejects_hostless_and_bad_port() {
        assert!(normalize("https:///path-only").is_err());
        assert!(normalize("https://example.com:notaport/").is_err());
        assert!(normalize("mailto:hi@example.com").is_err());
        assert!(!is_valid(""));
    }

    #[test]
    fn resolve_relative_against_base() {
        let base = Url::parse("https://example.com/blog/post").unwrap();
        assert_eq!(
            resolve("../about/", &base).unwrap(),
            "https://example.com/about"
        );
        assert_eq!(
            resolve("https://other.com/x?utm_medium=a", &base).unwrap(),
            "https://other.com/x"
        );
    }

    #[test]
    fn equivalent_ignores_tracking_noise() {
        assert!(equivalent(
            "https://EX.com/old?utm_source=x",
            "https://ex.com/old"
        ));
        assert!(!equivalent("https://ex.com/old", "https://ex.com/new"));
    }
}
