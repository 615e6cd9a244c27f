pub mod buildings;
pub mod carriers;
pub mod flows;
pub mod ids;
pub mod potentials;
