//!A mod for the error types
use std::fmt::{self, Debug, Display};

///Common error type returned when building modules from configuration.
pub enum BuildError {
    Message(String),
    Messages(Vec<String>),
}

impl BuildError {
    pub fn from_string(msg: String) -> Self {
        BuildError::Message(msg)
    }
    pub fn from_errs(errs: Vec<BuildError>) -> Self {
        let mut messages = Vec::with_capacity(errs.len());
        for err in errs {
            match err {
                Self::Message(msg) => messages.push(msg),
                Self::Messages(mut msgs) => messages.append(&mut msgs),
            }
        }
        Self::Messages(messages)
    }
    pub fn message(msg: &str) -> Self {
        BuildError::Message(msg.to_string())
    }
    pub fn messages(msgs: &[String]) -> Self {
        BuildError::Messages(msgs.to_vec())
    }
}

impl Debug for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(message) => f.write_fmt(format_args!("BuildError: {}", message)),
            Self::Messages(messages) => f.write_fmt(format_args!(
                "BuildError (multiple): \n{}",
                messages.join("\n")
            )),
        }
    }
}

impl Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(message) => f.write_str(message),
            Self::Messages(messages) => f.write_str(&messages.join("; ")),
        }
    }
}

impl std::error::Error for BuildError {}

#[cfg(test)]
mod tests {
    use super::BuildError;

    #[test]
    fn from_errs_flattens_nested_messages() {
        let err = BuildError::from_errs(vec![
            BuildError::message("first"),
            BuildError::messages(&["second".to_string(), "third".to_string()]),
        ]);
        match err {
            BuildError::Messages(msgs) => assert_eq!(msgs, vec!["first", "second", "third"]),
            BuildError::Message(_) => panic!("expected multiple messages"),
        }
    }
}
