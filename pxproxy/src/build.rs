/*
 * SPDX-License-Identifier: Apache-2.0
 */

pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn print_version() {
    println!("{PKG_NAME} {VERSION}");
}
