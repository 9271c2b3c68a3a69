pub mod bookmyshow;
pub mod khalti;
pub mod mimorin;
