use crate::Error;

const BAD_WINDOWS_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Module,
    File,
}

/// Checks that `path` is usable as a module path.
///
/// The first element must look like a domain name (lower case, containing a
/// dot); later elements may use ASCII letters, digits and `-._~`.
///
/// Major version suffixes are not checked. Go rejects paths ending in `/v0`
/// or `/v1`, but this crate accepts them, so archives for 0.x releases can
/// be named `<path>/v0@v0.x.y`. The go command itself will not request such
/// a path.
pub fn check_module_path(path: &str) -> Result<(), Error> {
    let invalid = |reason: &str| Error::InvalidModulePath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let first = path.split('/').next().unwrap_or_default();
    if first.is_empty() {
        return Err(invalid("missing leading domain element"));
    }
    if !first.contains('.') {
        return Err(invalid("missing dot in first path element"));
    }
    if first.starts_with('-') {
        return Err(invalid("leading dash in first path element"));
    }
    if let Some(c) = first
        .chars()
        .find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
    {
        return Err(invalid(&format!("invalid char {c:?} in first path element")));
    }

    check_elements(path, Kind::Module).map_err(|reason| invalid(&reason))
}

/// Checks that `path` is a portable, slash-separated file path inside a module.
pub fn check_file_path(path: &str) -> Result<(), Error> {
    check_elements(path, Kind::File).map_err(|reason| Error::InvalidFilePath {
        path: path.to_string(),
        reason,
    })
}

/// Checks that `version` is a canonical `v`-prefixed semantic version.
pub fn check_version(version: &str) -> Result<(), Error> {
    let invalid = |reason: String| Error::InvalidVersion {
        version: version.to_string(),
        reason,
    };

    let Some(bare) = version.strip_prefix('v') else {
        return Err(invalid("missing leading v".to_string()));
    };
    let parsed = semver::Version::parse(bare).map_err(|err| invalid(err.to_string()))?;
    if !parsed.build.is_empty() {
        return Err(invalid("build metadata is not allowed".to_string()));
    }
    Ok(())
}

fn check_elements(path: &str, kind: Kind) -> Result<(), String> {
    if path.is_empty() {
        return Err("empty string".to_string());
    }
    if path.starts_with('/') {
        return Err("leading slash".to_string());
    }
    if path.ends_with('/') {
        return Err("trailing slash".to_string());
    }
    if path.contains("//") {
        return Err("double slash".to_string());
    }
    path.split('/').try_for_each(|elem| check_element(elem, kind))
}

fn check_element(elem: &str, kind: Kind) -> Result<(), String> {
    if elem.chars().all(|c| c == '.') {
        return Err(format!("invalid path element {elem:?}"));
    }
    if kind == Kind::Module && elem.starts_with('.') {
        return Err(format!("leading dot in path element {elem:?}"));
    }
    if elem.ends_with('.') {
        return Err(format!("trailing dot in path element {elem:?}"));
    }

    let allowed = match kind {
        Kind::Module => module_char_ok,
        Kind::File => file_char_ok,
    };
    if let Some(c) = elem.chars().find(|c| !allowed(*c)) {
        return Err(format!("invalid char {c:?}"));
    }

    let short = elem.split('.').next().unwrap_or(elem);
    if BAD_WINDOWS_NAMES
        .iter()
        .any(|bad| bad.eq_ignore_ascii_case(short))
    {
        return Err(format!("{elem:?} disallowed as path element component on Windows"));
    }
    Ok(())
}

fn module_char_ok(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~')
}

fn file_char_ok(c: char) -> bool {
    if c.is_ascii() {
        return c.is_ascii_alphanumeric()
            || matches!(
                c,
                '!' | '#'
                    | '$'
                    | '%'
                    | '&'
                    | '('
                    | ')'
                    | '+'
                    | ','
                    | '-'
                    | '.'
                    | '='
                    | '@'
                    | '['
                    | ']'
                    | '^'
                    | '_'
                    | '{'
                    | '}'
                    | '~'
                    | ' '
            );
    }
    c.is_alphabetic()
}
