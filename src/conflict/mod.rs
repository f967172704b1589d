/// This module contains logic for detecting per-key conflicts at prepare time.
pub mod detection;
/// This module contains the pluggable validator invoked during prepare.
pub mod validator;
