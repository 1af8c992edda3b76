//! Information about the running process.

use crate::EnvError;

/// Absolute path of the running executable.
///
/// The path is queried at its real length, so there is no platform path
/// limit to overflow. Non UTF-8 components are replaced lossily.
pub fn exe_path() -> Result<String, EnvError> {
    let path = std::env::current_exe().map_err(EnvError::ExePath)?;
    Ok(path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exe_path_is_absolute_and_non_empty() {
        let path = exe_path().expect("current executable");
        assert!(!path.is_empty());
        assert!(std::path::Path::new(&path).is_absolute());
    }

    #[test]
    fn error_codes_follow_errno_names() {
        let err = EnvError::ExePath(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(err.code(), "ENOENT");
        assert!(err.to_string().contains("executable path"));
    }
}
