//! No library surface of its own — scenarios live under `tests/`.
