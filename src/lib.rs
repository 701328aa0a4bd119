//! DrishtiSLAM - fiducial-marker pose-graph SLAM back end for planar robots.
//!
//! Fuses wheel odometry with bearing-range observations of uniquely
//! identified visual tags into a globally consistent trajectory and tag map.
//! The host binds the engine's callbacks to its transport; the crate itself
//! performs no message I/O.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │   (gates, graph updates, outlier gate, pruning)     │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌──────────────┬──────────────────┬──────────────────┐
//! │   detect/    │    bootstrap/    │       io/        │  ← Intake & I/O
//! │ (aggregator) │ (particle init)  │  (CSV tables)    │
//! └──────────────┴──────────────────┴──────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    graph/                           │  ← Estimation
//! │    (factors, stores, batch & incremental solve)     │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                 (types, math)                       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Pipeline
//!
//! Each odometry sample passes the movement gate; survivors are predicted
//! by composition with the last keyframe pose and pass the keyframe gate.
//! Keyframes feed the graph updater (between factor + per-detection
//! bearing-range factors), then the optimizer (incremental or batch
//! Levenberg-Marquardt), the outlier gate, the pruner, and the loop-closure
//! detector. Non-keyframes only advance a visualization estimate.

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Errors and configuration
// ============================================================================
pub mod config;
pub mod error;

// ============================================================================
// Layer 3: Factor graph and solvers (depends on core)
// ============================================================================
pub mod graph;

// ============================================================================
// Layer 4: Sensor intake, bootstrap, persistence
// ============================================================================
pub mod bootstrap;
pub mod detect;
pub mod io;

// ============================================================================
// Layer 5: Engine orchestration (depends on all layers)
// ============================================================================
pub mod engine;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use core::math;
pub use core::types::{OdometrySample, Point2D, Pose2D};

// Errors and configuration
pub use config::DrishtiConfig;
pub use error::{Result, SlamError};

// Graph
pub use graph::{
    DiagonalNoise, Factor, FactorStore, IncrementalOptimizer, IncrementalParams, Key, LmConfig,
    LmOptimizer, NoiseModels, OptimizationReport, StopReason, Value, Values,
};

// Intake and bootstrap
pub use bootstrap::{BootstrapPhase, InitDecision, PfBootstrap};
pub use detect::{
    planar_extrinsic, CameraInfo, DetectionAggregator, StaticTransforms, TagDetection,
    Transform3D, TransformLookup,
};
pub use io::{LandmarkTable, TrajectoryWriter};

// Engine
pub use engine::{LoopClosureDetector, LoopClosureEvent, StepOutput, TagSlam};
