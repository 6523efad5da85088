pub mod pot_provider;
