//! Bootstrap script injection for decrypted markup
//!
//! Every served document must carry exactly one reference to the bootstrap
//! script, placed immediately before the first `</head>`. Any reference the
//! author already embedded is removed first so a page never runs the
//! bootstrap twice.
//!
//! Matching is ASCII case-insensitive and works on a lowercased shadow of the
//! document; ASCII lowercasing preserves byte offsets, so indices found in the
//! shadow are valid in the original.

const SCRIPT_OPEN: &str = "<script";
const SCRIPT_CLOSE: &str = "</script>";
const HEAD_CLOSE: &str = "</head>";

/// Inject `<script src="{script_src}"></script>` into `html`.
///
/// Documents without a `</head>` are returned with existing references
/// removed and nothing inserted.
pub fn inject_bootstrap(html: &str, script_src: &str) -> String {
    let target = normalize_src(&script_src.to_ascii_lowercase()).to_string();
    let cleaned = strip_script_tags(html, &target);

    let shadow = cleaned.to_ascii_lowercase();
    match shadow.find(HEAD_CLOSE) {
        Some(at) => {
            let tag = format!("<script src=\"{script_src}\"></script>");
            let mut out = String::with_capacity(cleaned.len() + tag.len());
            out.push_str(&cleaned[..at]);
            out.push_str(&tag);
            out.push_str(&cleaned[at..]);
            out
        }
        None => cleaned,
    }
}

/// Remove every empty `<script ...>` element whose `src` resolves to `target`.
fn strip_script_tags(html: &str, target: &str) -> String {
    let shadow = html.to_ascii_lowercase();
    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;
    let mut search_from = 0;

    while let Some(rel) = shadow[search_from..].find(SCRIPT_OPEN) {
        let start = search_from + rel;
        let Some(gt_rel) = shadow[start..].find('>') else {
            break;
        };
        let open_end = start + gt_rel + 1;
        let attrs = &shadow[start + SCRIPT_OPEN.len()..open_end - 1];

        let is_target = src_attr(attrs).is_some_and(|src| normalize_src(src) == target);
        if is_target && shadow[open_end..].starts_with(SCRIPT_CLOSE) {
            out.push_str(&html[cursor..start]);
            cursor = open_end + SCRIPT_CLOSE.len();
            search_from = cursor;
        } else {
            search_from = open_end;
        }
    }

    out.push_str(&html[cursor..]);
    out
}

/// Value of the `src` attribute in a (lowercased) opening tag body.
fn src_attr(attrs: &str) -> Option<&str> {
    let bytes = attrs.as_bytes();
    let mut from = 0;
    while let Some(rel) = attrs[from..].find("src") {
        let at = from + rel;
        from = at + 3;
        if at > 0 && !bytes[at - 1].is_ascii_whitespace() {
            continue;
        }
        let Some(rest) = attrs[from..].trim_start().strip_prefix('=') else {
            continue;
        };
        let rest = rest.trim_start();
        return match rest.chars().next() {
            Some(q @ ('"' | '\'')) => rest[1..].split(q).next(),
            _ => rest.split(|c: char| c.is_ascii_whitespace()).next(),
        };
    }
    None
}

/// Same-site script path with `./` and leading slashes removed.
fn normalize_src(src: &str) -> &str {
    let src = src.trim();
    src.strip_prefix("./").unwrap_or(src).trim_start_matches('/')
}
