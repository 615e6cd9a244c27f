use slotmap::new_key_type;

new_key_type! {
    /// Unique identifier for a building within a domain.
    pub struct BuildingId;
}
