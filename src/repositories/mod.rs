//! # Repository Layer
//!
//! This module contains repository implementations that encapsulate SeaORM
//! operations for database entities. Token sealing and opening happens at
//! this seam so entities never touch the crypto key.

pub mod integration;

pub use integration::IntegrationRepository;
