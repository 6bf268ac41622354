pub mod settings_seed;
