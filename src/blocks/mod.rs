//! blocks — covariance block contracts, factory registry, and built-ins.
//!
//! Purpose
//! -------
//! Define the polymorphic building blocks every covariance operator is
//! assembled from and the machinery that assembles them: the
//! [`CentralBlock`] / [`OuterBlock`] traits with their two-phase lifecycle
//! ([`BlockState`]), the explicit name → constructor [`BlockRegistry`], the
//! built-in [`Identity`] and [`StdDev`] blocks, and the assembly-time
//! consistency gates in [`testing`].
//!
//! Key behaviors
//! -------------
//! - Every block implements in-place `multiply` plus the lifecycle calls
//!   (`read` / `direct_calibration` / `write`); central blocks add
//!   `randomize`, outer blocks add adjoints and exact inverses.
//! - Two-phase initialization is explicit: operators are installed through
//!   exactly one of the read/calibration paths, and applying a block before
//!   that transition panics (programming-contract violation, unrecoverable).
//! - The registry is an explicit object passed into assembly code — no
//!   process-global mutable state; duplicate registration and unknown-name
//!   lookup are fatal configuration errors at assembly time.
//!
//! Invariants & assumptions
//! ------------------------
//! - Block operator state is read-only during `multiply`/`randomize` and
//!   mutated only during `read`/`direct_calibration`, strictly before or
//!   after the read-only phase — never interleaved. No locking is required
//!   under this discipline.
//! - Outer blocks preserve variable names and level counts; central blocks
//!   may terminate the representation.
//! - Unsupported operations carry "use X instead" guidance; consistency-test
//!   failures are fatal gates, not warnings.
//!
//! Downstream usage
//! ----------------
//! - `chains::BlockChain` assembles outer blocks and a central block from
//!   declarative configuration via the registry, driving calibration and
//!   the consistency gates.
//! - `covariance::ErrorCovariance` combines assembled chains into the final
//!   (possibly hybrid) operator.

pub mod errors;
pub mod identity;
pub mod registry;
pub mod stddev;
pub mod testing;
pub mod traits;

pub use self::errors::{BlockError, BlockKind, BlockResult};
pub use self::identity::Identity;
pub use self::registry::{BlockRegistry, CentralConstructor, OuterConstructor};
pub use self::stddev::StdDev;
pub use self::traits::{BlockContext, BlockState, CentralBlock, OuterBlock};
