/// Check arity of a builtin's arguments, returning `DernError::Arity` on mismatch.
///
/// ```ignore
/// check_arity!(args, "uid", 1);
/// check_arity!(args, "port-read", 1..=2);
/// check_arity!(args, "find", 2..);
/// ```
#[macro_export]
macro_rules! check_arity {
    ($args:expr, $name:expr, $exact:literal) => {
        if $args.len() != $exact {
            return Err($crate::DernError::arity(
                $name,
                stringify!($exact),
                $args.len(),
            )
            .into());
        }
    };
    ($args:expr, $name:expr, $lo:literal ..= $hi:literal) => {
        if $args.len() < $lo || $args.len() > $hi {
            return Err($crate::DernError::arity(
                $name,
                concat!(stringify!($lo), "-", stringify!($hi)),
                $args.len(),
            )
            .into());
        }
    };
    ($args:expr, $name:expr, $lo:literal ..) => {
        if $args.len() < $lo {
            return Err($crate::DernError::arity(
                $name,
                concat!("at least ", stringify!($lo)),
                $args.len(),
            )
            .into());
        }
    };
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DernError {
    #[error("{0}")]
    Eval(String),

    #[error("{context} expects {expected}. Now it is of type '{got}'.")]
    Type {
        context: String,
        expected: String,
        got: String,
    },

    #[error("Builtin '{name}' expects {expected} argument(s). {got} arguments were given.")]
    Arity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("Unbound symbol '{0}'")]
    Unbound(String),

    #[error("{0}")]
    Read(String),

    #[error("{0}")]
    Io(String),

    #[error("{inner}\n\tAt form: >>>>>>>>>>{form}<<<<<<<<<<\n")]
    WithForm { inner: Box<DernError>, form: String },
}

impl DernError {
    pub fn eval(msg: impl Into<String>) -> Self {
        DernError::Eval(msg.into())
    }

    /// `context` names the consumer, e.g. "First argument to builtin 'len'".
    pub fn type_error(
        context: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        DernError::Type {
            context: context.into(),
            expected: expected.into(),
            got: got.into(),
        }
    }

    pub fn arity(name: impl Into<String>, expected: impl Into<String>, got: usize) -> Self {
        DernError::Arity {
            name: name.into(),
            expected: expected.into(),
            got,
        }
    }

    pub fn unbound(name: impl Into<String>) -> Self {
        DernError::Unbound(name.into())
    }

    pub fn read(msg: impl Into<String>) -> Self {
        DernError::Read(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        DernError::Io(msg.into())
    }

    /// Append an "At form" trailer naming the form that was being evaluated.
    pub fn with_form(self, form: impl Into<String>) -> Self {
        DernError::WithForm {
            inner: Box::new(self),
            form: form.into(),
        }
    }

    /// The innermost error, with every form trailer stripped.
    pub fn root_cause(&self) -> &DernError {
        match self {
            DernError::WithForm { inner, .. } => inner.root_cause(),
            other => other,
        }
    }
}

impl From<std::io::Error> for DernError {
    fn from(e: std::io::Error) -> Self {
        DernError::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn needs_two(args: &[i32]) -> Result<(), DernError> {
        check_arity!(args, "pair", 2);
        Ok(())
    }

    fn needs_range(args: &[i32]) -> Result<(), DernError> {
        check_arity!(args, "range", 1..=2);
        Ok(())
    }

    fn needs_some(args: &[i32]) -> Result<(), DernError> {
        check_arity!(args, "some", 1..);
        Ok(())
    }

    #[test]
    fn test_check_arity_forms() {
        assert!(needs_two(&[1, 2]).is_ok());
        assert_eq!(
            needs_two(&[1]).unwrap_err().to_string(),
            "Builtin 'pair' expects 2 argument(s). 1 arguments were given."
        );
        assert!(needs_range(&[1]).is_ok());
        assert!(needs_range(&[1, 2, 3]).is_err());
        assert!(needs_some(&[]).is_err());
        assert!(needs_some(&[1, 2, 3]).is_ok());
    }

    #[test]
    fn test_form_trailers_nest_innermost_first() {
        let err = DernError::eval("boom").with_form("(a)").with_form("(b (a))");
        assert_eq!(
            err.to_string(),
            "boom\n\tAt form: >>>>>>>>>>(a)<<<<<<<<<<\n\n\tAt form: >>>>>>>>>>(b (a))<<<<<<<<<<\n"
        );
        assert_eq!(err.root_cause(), &DernError::eval("boom"));
    }
}
