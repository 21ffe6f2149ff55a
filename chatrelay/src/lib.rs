// Copyright 2026 The Chatrelay Project
// SPDX-License-Identifier: Apache-2.0

pub mod backend;
pub mod config;
pub mod consumer;
pub mod message;
pub mod relay;
pub mod stream;
pub mod transcript;
