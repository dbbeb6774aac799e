mod clone;
mod comm;
mod config;
mod coupling;
mod discretization;
mod element;
mod result_test;
mod scenarios;
