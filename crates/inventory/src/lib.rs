//! Per-garage spare-parts inventory.

pub mod spare_part;

pub use spare_part::{
    AddSparePart, AdjustStock, DEFAULT_LOW_STOCK_THRESHOLD, InventoryCommand, InventoryEvent,
    ReleaseStock, ReserveStock, SparePart, SparePartAdded, SparePartId, SparePartUpdated,
    StockAdjusted, StockReleased, StockReserved, UpdateSparePart, normalize_part_number,
};
