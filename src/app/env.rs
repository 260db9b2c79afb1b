use crate::app::aws::Credentials;
use std::ffi::{OsStr, OsString};
use thiserror::Error;

pub const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

/// Variables dropped from the parent environment so stale credentials cannot leak into the child.
pub const DENYLIST: &[&str] = &[
    "AWS_ROLE_ARN",
    ACCESS_KEY_ID,
    SECRET_ACCESS_KEY,
    SESSION_TOKEN,
    "AWS_WEB_IDENTITY_TOKEN_FILE",
];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EnvError {
    #[error("invalid environ: {0:?}")]
    InvalidEntry(String),
}

/// Environment handed to the child process, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildEnv {
    vars: Vec<(OsString, OsString)>,
}

impl ChildEnv {
    /// Injects `credentials` ahead of the `KEY=VALUE` entries of `environ`,
    /// skipping any entry whose key is in [`DENYLIST`].
    ///
    /// Values are carried over byte for byte; only the key is inspected.
    pub fn build<I, S>(credentials: &Credentials, environ: I) -> Result<Self, EnvError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut vars = vec![
            (ACCESS_KEY_ID.into(), credentials.access_key_id.clone().into()),
            (
                SECRET_ACCESS_KEY.into(),
                credentials.secret_access_key.clone().into(),
            ),
            (SESSION_TOKEN.into(), credentials.session_token.clone().into()),
        ];

        for entry in environ {
            let entry = entry.as_ref();
            let (key, value) = split_entry(entry)
                .ok_or_else(|| EnvError::InvalidEntry(entry.to_string_lossy().into_owned()))?;
            if DENYLIST.iter().any(|denied| key == OsStr::new(denied)) {
                continue;
            }
            vars.push((key.to_os_string(), value.to_os_string()));
        }

        Ok(ChildEnv { vars })
    }

    pub fn vars(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }
}

#[cfg(unix)]
fn split_entry(entry: &OsStr) -> Option<(&OsStr, &OsStr)> {
    use std::os::unix::ffi::OsStrExt;

    let bytes = entry.as_bytes();
    let at = bytes.iter().position(|b| *b == b'=')?;
    Some((
        OsStr::from_bytes(&bytes[..at]),
        OsStr::from_bytes(&bytes[at + 1..]),
    ))
}

#[cfg(not(unix))]
fn split_entry(entry: &OsStr) -> Option<(&OsStr, &OsStr)> {
    let (key, value) = entry.to_str()?.split_once('=')?;
    Some((OsStr::new(key), OsStr::new(value)))
}

/// The current process environment as `KEY=VALUE` entries.
pub fn parent_environ() -> Vec<OsString> {
    std::env::vars_os()
        .map(|(key, value)| {
            let mut entry = key;
            entry.push("=");
            entry.push(value);
            entry
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            access_key_id: "ASIAEXAMPLE".to_string(),
            secret_access_key: "secret".to_string(),
            session_token: "token".to_string(),
            expiration: None,
        }
    }

    fn entries(env: &ChildEnv) -> Vec<String> {
        env.vars()
            .map(|(k, v)| format!("{}={}", k.to_string_lossy(), v.to_string_lossy()))
            .collect()
    }

    fn injected() -> Vec<String> {
        vec![
            "AWS_ACCESS_KEY_ID=ASIAEXAMPLE".to_string(),
            "AWS_SECRET_ACCESS_KEY=secret".to_string(),
            "AWS_SESSION_TOKEN=token".to_string(),
        ]
    }

    #[test]
    fn test_clean_environ_is_appended_in_order() {
        let environ = ["PATH=/usr/bin:/bin", "HOME=/root", "LANG=C.UTF-8"];
        let env = ChildEnv::build(&credentials(), environ).unwrap();

        let mut expected = injected();
        expected.extend(environ.iter().map(|e| e.to_string()));
        assert_eq!(entries(&env), expected);
    }

    #[test]
    fn test_denylisted_keys_are_stripped() {
        let environ = [
            "AWS_ACCESS_KEY_ID=AKIAOLD",
            "PATH=/bin",
            "AWS_SECRET_ACCESS_KEY=old",
            "AWS_SESSION_TOKEN=old",
            "AWS_ROLE_ARN=arn:aws:iam::1:role/old",
            "AWS_WEB_IDENTITY_TOKEN_FILE=/var/run/token",
            "AWS_REGION=eu-west-2",
        ];
        let env = ChildEnv::build(&credentials(), environ).unwrap();

        let mut expected = injected();
        expected.push("PATH=/bin".to_string());
        expected.push("AWS_REGION=eu-west-2".to_string());
        assert_eq!(entries(&env), expected);
    }

    #[test]
    fn test_injected_keys_appear_once_and_first() {
        let environ = [
            "AWS_SESSION_TOKEN=a",
            "AWS_SESSION_TOKEN=b",
            "AWS_ACCESS_KEY_ID=c",
            "X=1",
        ];
        let env = ChildEnv::build(&credentials(), environ).unwrap();

        for key in DENYLIST {
            let count = env.vars().filter(|(k, _)| *k == OsStr::new(key)).count();
            assert!(count <= 1, "{key} appears {count} times");
        }
        let keys: Vec<&OsStr> = env.vars().map(|(k, _)| k).collect();
        assert_eq!(
            keys,
            vec![
                OsStr::new(ACCESS_KEY_ID),
                OsStr::new(SECRET_ACCESS_KEY),
                OsStr::new(SESSION_TOKEN),
                OsStr::new("X"),
            ]
        );
    }

    #[test]
    fn test_values_keep_embedded_equals() {
        let env = ChildEnv::build(&credentials(), ["OPTS=a=b=c", "EMPTY="]).unwrap();
        assert_eq!(&entries(&env)[3..], &["OPTS=a=b=c", "EMPTY="]);
    }

    #[test]
    fn test_entry_without_separator_is_invalid() {
        let result = ChildEnv::build(&credentials(), ["PATH=/bin", "GARBAGE"]);
        assert_eq!(result, Err(EnvError::InvalidEntry("GARBAGE".to_string())));
    }

    #[test]
    fn test_empty_environ_has_only_credentials() {
        let env = ChildEnv::build(&credentials(), Vec::<String>::new()).unwrap();
        assert_eq!(entries(&env), injected());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_value_is_passed_through() {
        use std::os::unix::ffi::OsStrExt;

        let value = OsStr::from_bytes(b"caf\xe9");
        let mut entry = OsString::from("LATIN1=");
        entry.push(value);

        let env = ChildEnv::build(&credentials(), [entry]).unwrap();
        let (key, kept) = env.vars().nth(3).unwrap();
        assert_eq!(key, OsStr::new("LATIN1"));
        assert_eq!(kept.as_bytes(), b"caf\xe9");
    }

    #[cfg(unix)]
    #[test]
    fn test_parent_environ_keeps_non_utf8_values() {
        use std::os::unix::ffi::OsStrExt;

        std::env::set_var("AWS_ASSUME_ROLE_TEST_BYTES", OsStr::from_bytes(b"caf\xe9"));
        let environ = parent_environ();
        let env = ChildEnv::build(&credentials(), &environ).unwrap();

        let kept = env
            .vars()
            .find(|(k, _)| *k == OsStr::new("AWS_ASSUME_ROLE_TEST_BYTES"))
            .map(|(_, v)| v.as_bytes().to_vec());
        assert_eq!(kept, Some(b"caf\xe9".to_vec()));
    }
}
