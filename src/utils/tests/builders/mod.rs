//! Test builders for the domain model.
