use axum::{debug_handler, http::header, response::{Html, IntoResponse, Response}};

#[macro_export]
macro_rules! include_res {
    (bytes, $p:expr) => {
        include_bytes!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
}

#[debug_handler]
pub async fn stylesheet() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css")], include_res!(str, "/style.css"))
}

/// Page shown for anything the user may not see.
pub fn sorry(what: &str) -> Response {
    Html(fill(include_res!(str, "/pages/sorry.html"), &[("what", &escape(what))])).into_response()
}

/// Substitutes `{key}` placeholders in a single left-to-right pass. Inserted
/// values are never scanned again, and unknown `{...}` text is kept as is.
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let key = &after[..close];
            values
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, value)| (*value, close))
        });

        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Escapes text for HTML bodies and double-quoted attributes.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_does_not_rescan_inserted_text() {
        let html = fill("<b>{name}</b><i>{preview}</i>", &[("name", "{preview}"), ("preview", "Eve: secret")]);
        assert_eq!(html, "<b>{preview}</b><i>Eve: secret</i>");
    }

    #[test]
    fn fill_keeps_unknown_braces() {
        let script = "ws.send(JSON.stringify({ search: q })); `${scheme}://{host}`";
        assert_eq!(fill(script, &[("host", "h")]), "ws.send(JSON.stringify({ search: q })); `${scheme}://h`");
        assert_eq!(fill("{a}{a}{", &[("a", "1")]), "11{");
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape(r#"<b class="x">Tom & 'Jerry'</b>"#), "&lt;b class=&quot;x&quot;&gt;Tom &amp; &#39;Jerry&#39;&lt;/b&gt;");
    }
}
