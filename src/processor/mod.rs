pub mod trigger_input;
