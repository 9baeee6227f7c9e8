//! Common error types for Corral.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`CorralError`].
pub type CorralResult<T> = Result<T, CorralError>;

/// Boxed error carried by [`CorralError::Backend`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors returned by the pod and container lifecycle operations.
#[derive(Error, Diagnostic, Debug)]
pub enum CorralError {
    /// The runtime has been shut down.
    #[error("Runtime has already been stopped")]
    #[diagnostic(
        code(corral::runtime::stopped),
        help("Create a new runtime handle to continue")
    )]
    RuntimeStopped,

    /// The pod has already been removed.
    #[error("Pod {id} has already been removed")]
    #[diagnostic(code(corral::pod::removed))]
    PodRemoved {
        /// The removed pod.
        id: String,
    },

    /// The container has already been removed.
    #[error("Container {id} has already been removed")]
    #[diagnostic(code(corral::container::removed))]
    ContainerRemoved {
        /// The removed container.
        id: String,
    },

    /// Pod not found.
    #[error("Pod not found: {id}")]
    #[diagnostic(code(corral::pod::not_found))]
    PodNotFound {
        /// The pod ID or name that was not found.
        id: String,
    },

    /// Container not found.
    #[error("Container not found: {id}")]
    #[diagnostic(code(corral::container::not_found))]
    ContainerNotFound {
        /// The container ID that was not found.
        id: String,
    },

    /// A pod with this ID is already registered.
    #[error("Pod already exists: {id}")]
    #[diagnostic(code(corral::pod::exists))]
    PodExists {
        /// The duplicate pod ID.
        id: String,
    },

    /// A container with this ID is already registered.
    #[error("Container already exists: {id}")]
    #[diagnostic(code(corral::container::exists))]
    ContainerExists {
        /// The duplicate container ID.
        id: String,
    },

    /// The name is already taken.
    #[error("Name is already in use: {name}")]
    #[diagnostic(code(corral::name_in_use))]
    NameInUse {
        /// The conflicting name.
        name: String,
    },

    /// An ID prefix matched more than one entity.
    #[error("ID prefix {prefix} is ambiguous ({matches} matches)")]
    #[diagnostic(
        code(corral::ambiguous_id),
        help("Supply more characters of the ID")
    )]
    AmbiguousId {
        /// The prefix that was looked up.
        prefix: String,
        /// Number of matching entities.
        matches: usize,
    },

    /// The pod still has containers and removal of them was not requested.
    #[error("Pod {id} contains {count} container(s) and cannot be removed")]
    #[diagnostic(
        code(corral::pod::not_empty),
        help("Request removal of the pod's containers as well")
    )]
    PodNotEmpty {
        /// The pod ID.
        id: String,
        /// Number of member containers.
        count: usize,
    },

    /// A member container is in a state that prevents the operation.
    #[error("Pod {pod} contains container {container} which {reason}")]
    #[diagnostic(code(corral::container::state_invalid))]
    ContainerStateInvalid {
        /// The pod ID.
        pod: String,
        /// The offending container.
        container: String,
        /// Why the container blocks the operation.
        reason: String,
    },

    /// A container outside the pod depends on a member container.
    #[error("Container {dependent} depends on container {container} of pod {pod} but is not in the pod")]
    #[diagnostic(
        code(corral::container::dependency),
        help("Remove the dependent container first")
    )]
    DependencyViolation {
        /// The member container that is depended upon.
        container: String,
        /// The non-member container depending on it.
        dependent: String,
        /// The pod ID.
        pod: String,
    },

    /// An argument was malformed or inconsistent with the configuration.
    #[error("Invalid argument: {message}")]
    #[diagnostic(code(corral::invalid_argument))]
    InvalidArgument {
        /// Description of the problem.
        message: String,
    },

    /// A state store, OCI runtime or cgroup operation failed.
    #[error("{context}")]
    #[diagnostic(code(corral::backend))]
    Backend {
        /// What was being done when the failure occurred.
        context: String,
        /// The underlying failure.
        #[source]
        source: BoxError,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(corral::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(corral::serialization))]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(corral::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// Internal error (should not happen).
    #[error("Internal error: {message}")]
    #[diagnostic(code(corral::internal), help("This is a bug, please report it"))]
    Internal {
        /// The error message.
        message: String,
    },
}

impl CorralError {
    /// Wrap an underlying failure with operation context.
    pub fn backend(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Backend {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Shorthand for [`CorralError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Returns true for the "not found" signals of the state store.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::PodNotFound { .. } | Self::ContainerNotFound { .. })
    }

    /// Follows [`CorralError::Backend`] wrappers down to the innermost
    /// `CorralError`, if the chain bottoms out in one.
    #[must_use]
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Backend { source, .. } => source
                .downcast_ref::<Self>()
                .map_or(self, Self::root_cause),
            _ => self,
        }
    }
}

/// Adds operation context to fallible results.
pub trait ResultExt<T> {
    /// Wrap the error in [`CorralError::Backend`] with the given context.
    fn context(self, context: impl Into<String>) -> CorralResult<T>;

    /// Like [`ResultExt::context`], building the message lazily.
    fn with_context<F, S>(self, f: F) -> CorralResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<BoxError>,
{
    fn context(self, context: impl Into<String>) -> CorralResult<T> {
        self.map_err(|e| CorralError::backend(context, e))
    }

    fn with_context<F, S>(self, f: F) -> CorralResult<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| CorralError::backend(f(), e))
    }
}

impl From<serde_json::Error> for CorralError {
    fn from(err: serde_json::Error) -> Self {
        CorralError::Serialization(err.to_string())
    }
}
