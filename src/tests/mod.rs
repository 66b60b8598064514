//! Whole-kernel tests driven through the simulation port.

mod helpers;
