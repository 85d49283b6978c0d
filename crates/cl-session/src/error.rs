use opencl3::error_codes::{
    CL_DEVICE_NOT_AVAILABLE, CL_MEM_OBJECT_ALLOCATION_FAILURE, CL_OUT_OF_HOST_MEMORY,
    CL_OUT_OF_RESOURCES, ClError,
};

/// Crate-wide error type. Each failure class of the session lifecycle
/// gets its own variant; backend status codes without a dedicated
/// meaning pass through as [`Error::Api`].
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("no device matches the selection: {0}")]
    Discovery(String),
    #[error("kernel build failed:\n{log}")]
    Compile { log: String },
    #[error("entry point `{0}` not found in program")]
    EntryPointNotFound(String),
    #[error("kernel argument binding: {0}")]
    ArgumentBinding(String),
    #[error("invalid work size: {0}")]
    InvalidWorkSize(String),
    #[error("backend refused resource acquisition (status {0})")]
    ResourceExhausted(i32),
    #[error("device reported an execution fault (status {0})")]
    KernelExecution(i32),
    #[error("{0} dependent resource(s) still reference the context")]
    ResourceStillInUse(usize),
    #[error("invalid buffer size: {0}")]
    InvalidSize(usize),
    #[error("OpenCL API error {0}")]
    Api(i32),
}

impl Error {
    pub(crate) fn from_status(code: i32) -> Self {
        match code {
            CL_DEVICE_NOT_AVAILABLE
            | CL_MEM_OBJECT_ALLOCATION_FAILURE
            | CL_OUT_OF_RESOURCES
            | CL_OUT_OF_HOST_MEMORY => Error::ResourceExhausted(code),
            _ => Error::Api(code),
        }
    }
}

impl From<ClError> for Error {
    fn from(err: ClError) -> Self {
        Error::from_status(err.0)
    }
}

impl From<i32> for Error {
    fn from(code: i32) -> Self {
        Error::from_status(code)
    }
}
