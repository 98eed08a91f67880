use sha2::{
    Digest,
    Sha256,
};
use std::{
    io::Read,
    path::{
        Component,
        Path,
    },
};

use crate::error::PlatformError;

/// A plan reference must be a bare `.jmx` file name; anything that
/// could step outside the plan root is refused before a record is
/// created or a process considered.
pub(crate) fn validate_plan_name(name: &str) -> Result<(), PlatformError> {
    if !name.ends_with(".jmx") {
        return Err(PlatformError::Validation(
            format!("only .jmx test plans are accepted: {name}")
        ));
    }
    if name.contains('\\') || name.contains('\0') {
        return Err(PlatformError::Validation(
            format!("test plan reference carries forbidden characters: {name}")
        ));
    }
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(PlatformError::Validation(
            format!("test plan reference must be a bare file name: {name}")
        )),
    }
}

/// SHA-256 of the file contents, hex encoded; recorded on the task for
/// auditing which upload actually ran.
pub(crate) fn file_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
    )
}
