use std::error::Error;
use std::fmt;

/// An ordered collection of independent failures.
///
/// Used where one failure must not stop the remaining work, e.g. undoing
/// host configuration during cleanup. An empty `MultiError` means success;
/// `into_result` performs that collapse.
#[derive(Debug)]
pub struct MultiError<E> {
    errors: Vec<E>,
}

impl<E> Default for MultiError<E> {
    fn default() -> Self {
        Self { errors: Vec::new() }
    }
}

impl<E> MultiError<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collect(&mut self, err: impl Into<E>) {
        self.errors.push(err.into());
    }

    /// Record the error of `result`, if any.
    pub fn check<T>(&mut self, result: Result<T, E>) {
        if let Err(e) = result {
            self.errors.push(e);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[E] {
        &self.errors
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl<E: fmt::Display> fmt::Display for MultiError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

impl<E: Error> Error for MultiError<E> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CheckError;

    #[test]
    fn empty_collapses_to_ok() {
        let errs: MultiError<CheckError> = MultiError::new();
        assert!(errs.is_empty());
        assert!(errs.into_result().is_ok());
    }

    #[test]
    fn keeps_errors_in_order() {
        let mut errs: MultiError<CheckError> = MultiError::new();
        errs.collect(CheckError::unmet("first"));
        errs.check(Ok(()));
        errs.check::<()>(Err(CheckError::unmet("second")));
        assert_eq!(errs.len(), 2);
        assert_eq!(errs.to_string(), "first\nsecond");
        let errs = errs.into_result().unwrap_err();
        assert_eq!(errs.errors()[1].to_string(), "second");
    }

    #[test]
    fn collects_convertible_errors() {
        let mut errs: MultiError<CheckError> = MultiError::new();
        errs.collect(std::io::Error::other("disk gone"));
        assert!(matches!(errs.errors()[0], CheckError::Io(_)));
    }
}
