//! Error types for catalog construction, request validation and manifest
//! assembly.
//!
//! Errors fall into three classes (see [`ErrorClass`]). Configuration errors
//! mean the static catalog itself is broken and should stop the process.
//! Validation and resource errors are caused by the request and are meant to
//! be reported back to whoever submitted it.

use thiserror::Error;

/// Broad classification used by callers to decide how to surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Defect in the static catalog. Abort startup, raise an alarm.
    Configuration,
    /// Bad input: incompatible customizations, missing OSTree parent, ...
    Validation,
    /// The request cannot be satisfied with the available space or layout.
    Resource,
}

#[derive(Error, Debug)]
pub enum Error {
    /// Broken catalog data (missing build package set, dangling alias).
    #[error("catalog configuration error: {0}")]
    Config(String),

    /// Incompatible customization or option for the image type.
    #[error("{0}")]
    Validation(String),

    /// One or more custom mountpoints are outside the allow-list.
    #[error("The following custom mountpoints are not supported {0:?}")]
    InvalidMountpoints(Vec<String>),

    /// Size or layout request that cannot be fulfilled.
    #[error("{0}")]
    Resource(String),

    #[error("invalid distribution: {0}")]
    UnknownDistro(String),

    #[error("invalid architecture: {0}")]
    UnknownArch(String),

    #[error("invalid image type: {0}")]
    UnknownImageType(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Config(_) | Error::Serialization(_) => ErrorClass::Configuration,
            Error::Validation(_)
            | Error::InvalidMountpoints(_)
            | Error::UnknownDistro(_)
            | Error::UnknownArch(_)
            | Error::UnknownImageType(_) => ErrorClass::Validation,
            Error::Resource(_) => ErrorClass::Resource,
        }
    }

    /// True when the caller, not the catalog, is at fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self.class(), ErrorClass::Configuration)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
