//! Shared error plumbing.
//!
//! Callback seams (route registration, subsystem init, teardown actions) carry
//! [`BoxError`]. When several failures have to be reported together they are
//! joined in a [`MultiError`], which keeps every error intact so callers can
//! still ask whether a particular error is among the causes.

use std::error::Error as StdError;
use std::fmt;

/// Boxed dynamic error used at callback boundaries.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A joined collection of errors.
///
/// Joining a `MultiError` into another flattens it, so the result is always a
/// single level deep.
#[derive(Debug, Default)]
pub struct MultiError {
    errors: Vec<BoxError>,
}

impl MultiError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an error. Nested `MultiError`s are flattened.
    pub fn push<E>(&mut self, err: E)
    where
        E: Into<BoxError>,
    {
        let err: BoxError = err.into();
        match err.downcast::<MultiError>() {
            Ok(nested) => self.errors.extend(nested.errors),
            Err(err) => self.errors.push(err),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(dyn StdError + Send + Sync + 'static)> {
        self.errors.iter().map(|e| e.as_ref())
    }

    /// Find the first joined error of type `E`, looking through each error's
    /// source chain as well.
    pub fn find<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.errors.iter().find_map(|err| {
            let mut current: Option<&(dyn StdError + 'static)> = Some(err.as_ref());
            while let Some(e) = current {
                if let Some(found) = e.downcast_ref::<E>() {
                    return Some(found);
                }
                current = e.source();
            }
            None
        })
    }

    /// Whether any joined error (or anything in its source chain) satisfies `pred`.
    pub fn contains<E, F>(&self, pred: F) -> bool
    where
        E: StdError + 'static,
        F: Fn(&E) -> bool,
    {
        self.errors.iter().any(|err| {
            let mut current: Option<&(dyn StdError + 'static)> = Some(err.as_ref());
            while let Some(e) = current {
                if e.downcast_ref::<E>().is_some_and(&pred) {
                    return true;
                }
                current = e.source();
            }
            false
        })
    }

    /// `Ok(())` when nothing was joined.
    pub fn into_result(self) -> Result<(), MultiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn into_inner(self) -> Vec<BoxError> {
        self.errors
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl StdError for MultiError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self.errors.as_slice() {
            [only] => Some(only.as_ref()),
            _ => None,
        }
    }
}

impl<E> Extend<E> for MultiError
where
    E: Into<BoxError>,
{
    fn extend<I: IntoIterator<Item = E>>(&mut self, iter: I) {
        for err in iter {
            self.push(err);
        }
    }
}

impl<E> FromIterator<E> for MultiError
where
    E: Into<BoxError>,
{
    fn from_iter<I: IntoIterator<Item = E>>(iter: I) -> Self {
        let mut joined = MultiError::new();
        joined.extend(iter);
        joined
    }
}
