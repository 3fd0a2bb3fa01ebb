// ==============================================================================
// lib.rs - Identity Vigilance Library
// ==============================================================================
// Description: Library interface for sample identity QC modules
// Author: Matt Barham
// Created: 2026-10-16
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

pub mod parsers;
pub mod config;
pub mod validator;
pub mod models;
pub mod signature;
pub mod genotype;
pub mod comparison;
pub mod similarity;
pub mod processor;
pub mod output;
