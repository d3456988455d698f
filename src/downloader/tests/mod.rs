use super::test_helpers::*;
use super::*;
use crate::error::{Error, QueueError};
use crate::types::{ClearFilter, EntryStatus, Event, JobSpec, Phase, Priority};
use std::time::Duration;
