//! # Auditoria Server
//!
//! The two processes of the audit pipeline and a development mode that runs
//! both:
//!
//! - **gateway**: accepts `POST /api/v1/acciones` and publishes each action
//!   to the audit topic
//! - **worker**: consumes the audit topic and writes every event to the fast
//!   store and the durable store
//! - **standalone**: gateway and worker sharing an in-memory bus

pub mod errors;
pub mod infra;
pub mod routes;
