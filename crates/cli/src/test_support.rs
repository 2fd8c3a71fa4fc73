use std::borrow::Cow;
use std::io::Write;
use tempfile::NamedTempFile;

/// `/db/reports` holds three XML documents (one readable only by its owner)
/// and a binary; `/db/archive` is closed to everyone but `editor`.
pub const STORE_MANIFEST: &str = r#"
[[users]]
name = "editor"
groups = ["staff"]

[[collections]]
uri = "/db/reports"

[[collections]]
uri = "/db/archive"
owner = "editor"
group = "staff"
mode = "0700"

[[documents]]
path = "/db/reports/q1.xml"

[[documents]]
path = "/db/reports/q2.xml"

[[documents]]
path = "/db/reports/draft.xml"
owner = "editor"
mode = "0600"

[[documents]]
path = "/db/reports/logo.png"
type = "binary"

[[documents]]
path = "/db/archive/2019.xml"
"#;

pub fn store_manifest() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(STORE_MANIFEST.as_bytes()).expect("write manifest");
    file
}

pub fn strip_ansi(input: &str) -> Cow<'_, str> {
    if !input.contains('\u{1b}') {
        return Cow::Borrowed(input);
    }

    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars();
    loop {
        match chars.next() {
            Some('\u{1b}') => {
                for next in chars.by_ref() {
                    if next == 'm' {
                        break;
                    }
                }
            }
            Some(ch) => result.push(ch),
            None => break,
        }
    }
    Cow::Owned(result)
}
