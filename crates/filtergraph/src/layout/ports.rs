//! Named, ordered port lists
//!
//! Every element of a filter graph exposes an ordered list of input ports and an ordered list
//! of output ports. Ports are addressed either by index or by their unique name.

use crate::error::{Error, Result};
use std::fmt;

/// Separator between the components of an element path such as `"denoise::blur"`
pub const PATH_SEPARATOR: &str = "::";

/// Checks that `name` can be used for an element or a port
pub(crate) fn validate_name(name: &str, what: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::configuration(format!("{what} name cannot be empty")));
    }
    if name.contains(PATH_SEPARATOR) {
        return Err(Error::configuration(format!("{what} name '{name}' cannot contain '{PATH_SEPARATOR}'")));
    }
    Ok(())
}

/// Splits an element path into its components
///
/// # Arguments
/// * `path` - A path such as `"outer::inner::filter"`
///
/// # Returns
/// The non-empty components of the path, outermost first
pub fn split_path(path: &str) -> Result<Vec<&str>> {
    let parts: Vec<&str> = path.split(PATH_SEPARATOR).collect();
    if parts.iter().any(|part| part.is_empty()) {
        return Err(Error::runtime(format!("invalid element path '{path}'")));
    }
    Ok(parts)
}

/// Ordered list of uniquely named ports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ports {
    names: Vec<String>,
}

impl Ports {
    /// Creates an empty port list
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a port and returns its index
    ///
    /// Fails if the name is invalid or already used in this list.
    pub fn add(&mut self, name: impl Into<String>) -> Result<usize> {
        let name = name.into();
        validate_name(&name, "port")?;
        if self.names.contains(&name) {
            return Err(Error::configuration(format!("port '{name}' is already declared")));
        }
        self.names.push(name);
        Ok(self.names.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns the name of the port at `index`
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Returns the index of the port called `name`
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.names.iter().map(String::as_str)
    }

    pub(crate) fn check(&self, index: usize, owner: &str, direction: &str) -> Result<()> {
        if index >= self.names.len() {
            return Err(Error::configuration(format!("{owner} has no {direction} port #{index} (it has {})", self.names.len())));
        }
        Ok(())
    }

    pub(crate) fn find(&self, name: &str, owner: &str, direction: &str) -> Result<usize> {
        self.index_of(name)
            .ok_or_else(|| Error::configuration(format!("{owner} has no {direction} port named '{name}'")))
    }
}

impl fmt::Display for Ports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.names.join(", "))
    }
}
