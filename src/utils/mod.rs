/*!
Small shared utilities: reproducible random variables and pose helpers.
*/

pub mod determinist_random_variable;
pub mod geometry;
