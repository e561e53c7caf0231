// Temporal attribute resolution
pub mod temporal;

// Spatial entities (nodes)
pub mod entity;

// Attribute-to-visual scales and palettes
pub mod scale;

// Retained element tree and event listeners
pub mod scene;

// Inter-widget messages and selectors
pub mod message;

// Message bus, emission guards and commands
pub mod bus;

// Data files and where they come from
pub mod data;

// Shared selection state
pub mod state;

// Map, scatter, heatmap, timeseries and slider
pub mod widgets;

// Dashboard configuration
pub mod config;

// Controller, built-in commands and animation
pub mod dashboard;
