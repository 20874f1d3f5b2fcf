//! Workspace-level integration tests for SkyReduce live under `tests/`.
