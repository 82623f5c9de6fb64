//! # NestConn: NEST-style connection construction
//!
//! Builds the synapses of large spiking networks the way the NEST simulator
//! (https://www.nest-simulator.org/) does: populations are wired by a
//! connectivity rule, and every connection gets its parameters from a
//! synapse spec resolved against a registry of synapse models.
//!
//! Key features:
//! - Rules: all_to_all, one_to_one, fixed in/out-degree, fixed total number,
//!   pairwise and symmetric Bernoulli
//! - Scalar, per-connection array and distributed parameters
//! - Built-in synapse catalogue with common and per-connection parameters
//! - Collocated synapses and deferred projections
//! - Connections sharded by target thread, reproducible for any thread count
//!
//! ```no_run
//! use nestconn::{ConnSpec, ConnectionFilter, ConnectivityRule, NodeModel, SimulationContext, SynapseSpec};
//!
//! let mut ctx = SimulationContext::with_threads(2)?;
//! let pre = ctx.create(NodeModel::IafPscAlpha, 10)?;
//! let post = ctx.create(NodeModel::IafPscAlpha, 10)?;
//! ctx.build(
//!     &pre,
//!     &post,
//!     &ConnSpec::new(ConnectivityRule::FixedIndegree { indegree: 3 }),
//!     &SynapseSpec::new("stdp_synapse").weight(2.0).delay(1.5),
//! )?;
//! let conns = ctx.get_connections(&ConnectionFilter::all().source(&pre));
//! assert_eq!(conns.len(), 30);
//! # Ok::<(), nestconn::NestError>(())
//! ```

pub mod builder;
pub mod config;
pub mod error;
pub mod kernel;
pub mod models;
pub mod nodes;
pub mod params;
pub mod projection;
pub mod rules;
pub mod spec;
pub mod table;

pub use config::{KernelConfig, Verbosity};
pub use error::{NestError, Result};
pub use kernel::{KernelStatus, SimulationContext};
pub use models::{ParamScope, SynapseRegistry, SynapseSchema};
pub use nodes::{NodeModel, ReceptorLayout};
pub use projection::{Projection, ProjectionCollection};
pub use rules::{ConnSpec, ConnectivityRule};
pub use spec::SynapseSpec;
pub use table::{Connection, ConnectionFilter, SynapseCollection};

pub use nestconn_core::{Distribution, NodeCollection, NodeId, ParamValue};
