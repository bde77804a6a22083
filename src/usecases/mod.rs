//! Usecases layer - orchestration over domain logic and ports.

pub mod sizing_service;
