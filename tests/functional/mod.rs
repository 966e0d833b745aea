//! Functional tests for the image generation orchestrator

mod common;

mod adapter_test;
