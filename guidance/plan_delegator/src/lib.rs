#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Maneuver-to-trajectory delegation engine: routes each maneuver of a plan to
//! the planner that owns it and stitches the returned segments into one trajectory.

/// Basic Safety Message core data and codec seam.
#[path = "../bsm/main.rs"]
pub mod bsm;
/// TOML configuration.
#[path = "../config.rs"]
pub mod config;
/// Delegation loop and cycle reports.
#[path = "../delegator/main.rs"]
pub mod delegator;
/// Error taxonomy.
#[path = "../error.rs"]
pub mod error;
/// Pose, twist and derived vehicle state.
#[path = "../geometry.rs"]
pub mod geometry;
/// Validity guards.
#[path = "../guards.rs"]
pub mod guards;
/// Maneuver variants and plans.
#[path = "../maneuver/main.rs"]
pub mod maneuver;
/// Runtime orchestration entry points.
#[path = "../main.rs"]
pub mod orchestration_entry;
/// Planner connections.
#[path = "../registry/main.rs"]
pub mod registry;
/// Planner request/response contract.
#[path = "../service.rs"]
pub mod service;
/// Latest-value state cache.
#[path = "../state.rs"]
pub mod state;
/// Telemetry helpers for the delegator.
#[path = "../telemetry.rs"]
pub mod telemetry;
/// Trajectory points and plans.
#[path = "../trajectory/main.rs"]
pub mod trajectory;

pub use bsm::{BsmCodec, BsmCodecError, BsmComposer, BsmCoreData};
pub use config::DelegatorConfig;
pub use delegator::{
    CycleOutcome, CycleReport, DelegatorOptions, DelegatorState, PlanDelegator,
};
pub use error::DelegatorError;
pub use geometry::{PoseStamped, TwistStamped, VehicleState};
pub use maneuver::{CommonField, CommonValue, Maneuver, ManeuverPlan, ManeuverType};
pub use orchestration_entry::{BsmBroadcast, DelegatorRuntime, RuntimeInputs};
pub use registry::{
    EndpointNaming, HttpPlannerConnector, InProcessConnector, PlannerConnection,
    PlannerConnector, PlannerRegistry, PlannerService,
};
pub use service::{PlanTrajectoryRequest, PlanTrajectoryResponse};
pub use state::{StateCache, StateSnapshot};
pub use telemetry::{DelegatorTelemetry, DelegatorTelemetryBuilder};
pub use trajectory::{TrajectoryPlan, TrajectoryPoint};
