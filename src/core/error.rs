//! Error types for Lazyflow.
//!
//! Uses thiserror for structured errors with context. Errors are designed to:
//! - Name the stage and port involved
//! - Carry the regions that failed to line up
//! - Convert into the umbrella [`LazyflowError`] with `?`

use crate::core::region::Region;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a stage node in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Create a new random node ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a node ID from a UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Unique identifier for a connection in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Top-level error type for Lazyflow.
///
/// This enum encompasses all error categories and enables automatic
/// conversion between specific error types.
#[derive(Error, Debug)]
pub enum LazyflowError {
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Region error: {0}")]
    Region(#[from] RegionError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Other(String),
}

/// Errors related to pipeline structure.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum GraphError {
    #[error("Stage {0} not found")]
    StageNotFound(NodeId),

    #[error("Connection {0} not found")]
    ConnectionNotFound(ConnectionId),

    #[error("Stage {node_id} has no input {index} (it declares {count})")]
    InputOutOfRange {
        node_id: NodeId,
        index: usize,
        count: usize,
    },

    #[error("Stage {node_id} has no output {index} (it declares {count})")]
    OutputOutOfRange {
        node_id: NodeId,
        index: usize,
        count: usize,
    },

    #[error("Cycle detected in pipeline involving stages: {nodes:?}")]
    CycleDetected { nodes: Vec<NodeId> },

    #[error("Input {index} on stage {node_id} is already connected")]
    InputAlreadyConnected { node_id: NodeId, index: usize },

    #[error("Input {index} on stage {node_id} is not connected")]
    MissingInput { node_id: NodeId, index: usize },

    #[error("Stage {node_id} is not a {expected}")]
    StageTypeMismatch { node_id: NodeId, expected: String },
}

/// Errors from region arithmetic.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionError {
    #[error("Region dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Errors from physical geometry construction.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeometryError {
    #[error("Geometry dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Spacing on axis {axis} must be positive and finite, got {value}")]
    NonPositiveSpacing { axis: usize, value: f64 },

    #[error("Direction matrix is singular")]
    SingularDirection,
}

/// Invalid schedule requests. Fatal to the requesting call, never coerced.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleError {
    #[error("Number of levels must be at least 1")]
    ZeroLevels,

    #[error("Schedule must have at least one axis")]
    ZeroDimension,

    #[error("Schedule axis count mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Schedule has {got} levels but {expected} were declared")]
    LevelCountMismatch { expected: usize, got: usize },

    #[error("Schedule level {level} has {got} factors, expected {expected}")]
    RaggedLevel {
        level: usize,
        expected: usize,
        got: usize,
    },

    #[error("Level {level} out of range for a {levels}-level schedule")]
    LevelOutOfRange { level: usize, levels: usize },
}

/// Errors from the pre-flight validation pass.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Missing required input {index} on stage {node_id}")]
    MissingRequiredInput { node_id: NodeId, index: usize },

    #[error("Invalid parameter '{parameter}' on stage {node_id}: {error}")]
    InvalidParameter {
        node_id: NodeId,
        parameter: String,
        error: String,
    },

    #[error("Pipeline contains a cycle")]
    CycleDetected,

    #[error("Stage {0} is not connected to any other stage")]
    IsolatedStage(NodeId),

    #[error("{0}")]
    Other(String),
}

/// Errors during the update protocol.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error(
        "Insufficient input for stage {node_id}, input {input}: requested {requested} does not intersect {largest}"
    )]
    InsufficientInput {
        node_id: NodeId,
        input: usize,
        requested: Region,
        largest: Region,
    },

    #[error(
        "Requested region {requested} on stage {node_id}, output {output} is outside the largest possible region {largest}"
    )]
    RequestedRegionOutOfBounds {
        node_id: NodeId,
        output: usize,
        requested: Region,
        largest: Region,
    },

    #[error("Cache inconsistency on stage {node_id}: {detail}")]
    StaleCacheInconsistency { node_id: NodeId, detail: String },

    #[error("Stage {node_id} failed: {error}")]
    StageFailed { node_id: NodeId, error: String },

    #[error("Stage {node_id} expected {expected} pixels on port {port}")]
    PixelTypeMismatch {
        node_id: NodeId,
        port: usize,
        expected: String,
    },

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] IoError),
}

/// Errors from the codec registry and the codecs themselves.
#[derive(Error, Debug)]
pub enum IoError {
    #[error("No codec can handle {path}")]
    NoCodec { path: String },

    #[error("Codec '{0}' is not registered")]
    UnknownCodec(String),

    #[error("Malformed header in {path}: {reason}")]
    MalformedHeader { path: String, reason: String },

    #[error("Unsupported data: {0}")]
    Unsupported(String),

    #[error("Container has no buffered data")]
    NotBuffered,

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Image codec error: {0}")]
    Image(#[from] image::ImageError),
}

/// Errors loading driver configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read configuration: {0}")]
    Read(#[from] std::io::Error),

    #[error("Cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

// ============================================================================
// Error Utilities
// ============================================================================

impl ValidationError {
    /// Check if this is a fatal error that should stop validation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ValidationError::CycleDetected)
    }

    /// Get suggestion for fixing this error.
    pub fn suggested_fix(&self) -> Option<String> {
        match self {
            ValidationError::MissingRequiredInput { index, .. } => {
                Some(format!("Connect an upstream output to input {}", index))
            }
            ValidationError::InvalidParameter {
                parameter, error, ..
            } => Some(format!("Adjust '{}': {}", parameter, error)),
            _ => None,
        }
    }

    /// Get list of affected node IDs.
    pub fn affected_nodes(&self) -> Vec<NodeId> {
        match self {
            ValidationError::MissingRequiredInput { node_id, .. }
            | ValidationError::InvalidParameter { node_id, .. }
            | ValidationError::IsolatedStage(node_id) => vec![*node_id],
            _ => vec![],
        }
    }
}

impl ExecutionError {
    /// Get the stage that caused this error, if applicable.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            ExecutionError::InsufficientInput { node_id, .. }
            | ExecutionError::RequestedRegionOutOfBounds { node_id, .. }
            | ExecutionError::StaleCacheInconsistency { node_id, .. }
            | ExecutionError::StageFailed { node_id, .. }
            | ExecutionError::PixelTypeMismatch { node_id, .. } => Some(*node_id),
            _ => None,
        }
    }

    /// Check if the caller can recover by adjusting its request.
    ///
    /// Internal invariant violations are never recoverable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ExecutionError::InsufficientInput { .. }
                | ExecutionError::RequestedRegionOutOfBounds { .. }
        )
    }
}

/// Result type alias for Lazyflow operations.
pub type LazyflowResult<T> = Result<T, LazyflowError>;

/// Result type alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;

/// Result type alias for region operations.
pub type RegionResult<T> = Result<T, RegionError>;

/// Result type alias for geometry operations.
pub type GeometryResult<T> = Result<T, GeometryError>;

/// Result type alias for schedule operations.
pub type ScheduleResult<T> = Result<T, ScheduleError>;

/// Result type alias for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Result type alias for execution operations.
pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Result type alias for codec operations.
pub type IoResult<T> = Result<T, IoError>;

// ============================================================================
// Validation Report
// ============================================================================

/// Comprehensive validation report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    /// Whether validation passed without errors.
    pub success: bool,
    /// List of errors found.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<ValidationWarning>,
    /// Time taken for validation in milliseconds.
    pub duration_ms: u64,
}

/// Non-fatal validation warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    /// Warning message.
    pub message: String,
    /// Stage that triggered the warning, if applicable.
    pub node_id: Option<NodeId>,
}

impl ValidationReport {
    /// Create a new empty report (success).
    pub fn new() -> Self {
        Self {
            success: true,
            errors: Vec::new(),
            warnings: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Add an error to the report.
    pub fn add_error(&mut self, error: ValidationError) {
        self.success = false;
        self.errors.push(error);
    }

    /// Add a warning to the report.
    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Check if the pipeline can be updated.
    pub fn can_execute(&self) -> bool {
        self.success
    }

    /// Get a human-readable summary.
    pub fn summary(&self) -> String {
        if self.success {
            if self.warnings.is_empty() {
                "Pipeline is valid".to_string()
            } else {
                format!("Pipeline is valid with {} warning(s)", self.warnings.len())
            }
        } else {
            format!("Validation failed with {} error(s)", self.errors.len())
        }
    }

    /// Get detailed error messages with suggestions.
    pub fn detailed_errors(&self) -> Vec<String> {
        self.errors
            .iter()
            .enumerate()
            .map(|(i, error)| {
                let mut msg = format!("{}. {}", i + 1, error);
                if let Some(fix) = error.suggested_fix() {
                    msg.push_str(&format!("\n   suggestion: {}", fix));
                }
                msg
            })
            .collect()
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}
