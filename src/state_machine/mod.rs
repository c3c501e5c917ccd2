// Task execution state machine
//
// queued -> running -> {succeeded, failed, denied}, with running -> queued
// for admission deferral and backoff retry.

pub mod states;

pub use states::TaskStatus;
