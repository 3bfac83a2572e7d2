//! CLI command implementations.
//!
//! | Module     | Commands handled                     |
//! |------------|--------------------------------------|
//! | `generate` | `Generate`                           |
//! | `plan`     | `Plan`                               |
//! | `serve`    | `Serve`                              |
//! | `config`   | `Config`                             |
//! | `render`   | event rendering shared by `Generate` |

pub mod config;
pub mod generate;
pub mod plan;
pub mod render;
pub mod serve;

pub use config::cmd_config;
pub use generate::{GenerateOptions, cmd_generate};
pub use plan::cmd_plan;
pub use serve::cmd_serve;
