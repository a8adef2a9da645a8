/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes two top-level commands plus the fixture format they share:

- `replay`   - Run a fixture's actions and print the active path
- `validate` - Check a fixture's messages for broken links and cycles
- `fixture`  - YAML fixture types
*/

pub mod fixture;
pub mod replay;
pub mod validate;

pub use fixture::{Action, Fixture, FixtureSession, MessageRef};
pub use replay::{replay_fixture, run_replay, ReplayReport};
pub use validate::{check_fixture, run_validate};
