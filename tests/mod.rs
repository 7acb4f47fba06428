//! Test suite for tripsync
//!
//! This module organizes all tests
