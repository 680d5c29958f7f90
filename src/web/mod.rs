//! HTTP API for suggestion requests, feedback and administration.
//!
//! ## Starting the Server
//!
//! ```text
//! # Start on default port 8080
//! loan-matcher serve --data directory.json
//!
//! # Custom port and configuration
//! loan-matcher serve --data directory.json --config matcher.toml --port 3000
//!
//! # Bind to all interfaces
//! loan-matcher serve --data directory.json --address 0.0.0.0
//! ```
//!
//! ## API Endpoints
//!
//! - `POST /api/suggestions` - Ranked suggestions for `{description, amount, mode}`
//! - `GET /api/suggestions/quick?q=&limit=` - Autocomplete from learned patterns
//! - `GET /api/suggestions/{id}` - A cached suggestion with its confidence breakdown
//! - `POST /api/feedback` - `{suggestion_id, was_correct, actual_target_id?}`
//! - `GET /api/engines` - Engine performance report
//! - `GET /api/engines/self-test` - Run every engine's self-test
//! - `POST /api/engines/{name}/enable`, `POST /api/engines/{name}/disable`
//! - `DELETE /api/cache` - Clear the suggestion cache
//! - `GET|POST /api/calibration` - Export or import the calibration snapshot
//! - `GET /api/calibration/weights` - Proposed engine weight changes
//! - `POST /api/calibration/weights/apply` - Apply the proposed weights
//! - `GET /api/calibration/trends` - Confidence trends and feedback accuracy
//! - `GET|POST /api/patterns` - Export or import the learned pattern table
//! - `POST /api/patterns/learn` - `{description, account}`
//! - `POST /api/patterns/refresh` - Rebuild the table from the tagged history
//! - `GET /api/patterns/stats` - Pattern table statistics
//! - `GET /api/stats` - Service statistics

pub mod server;
