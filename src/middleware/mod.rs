// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Middleware modules (trigger authentication, security headers).

pub mod security;
pub mod trigger_auth;

pub use security::add_security_headers;
pub use trigger_auth::require_trigger_token;
