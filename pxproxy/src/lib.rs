/*
 * SPDX-License-Identifier: Apache-2.0
 */

pub mod build;
pub mod config;
pub mod connect;
pub mod logging;
pub mod opts;
pub mod serve;
