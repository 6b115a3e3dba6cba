//! Arena handles.
//!
//! Every entity of a cutting pass lives in a [`slotmap::SlotMap`] owned by
//! the [`crate::Mesh`]; entities refer to each other through these keys.

slotmap::new_key_type! {
    /// Handle to a pooled point.
    pub struct PointId;
    /// Handle to a background or cutter node.
    pub struct NodeId;
    /// Handle to an edge between two nodes.
    pub struct EdgeId;
    /// Handle to an element side, cutter side or level-set side.
    pub struct SideId;
    /// Handle to a background element.
    pub struct ElementId;
    /// Handle to a facet.
    pub struct FacetId;
    /// Handle to a volume cell.
    pub struct CellId;
}
