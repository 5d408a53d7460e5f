replenish_core::typed_id!(
    /// Product identifier. Product master data lives outside this system; the
    /// planner only needs the key.
    ProductId
);
