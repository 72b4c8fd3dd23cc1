//! Quotagate - fixed-window rate limiting for HTTP edge functions
//!
//! This crate implements a per-identifier fixed-window request limiter with
//! lazy expiry and a background sweep, named policies, caller identification
//! from request metadata, and the standard 429 response handlers return when
//! a caller's quota is exhausted.

pub mod config;
pub mod error;
pub mod http;
pub mod ratelimit;
