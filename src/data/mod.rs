/// Data layer: raw histogram tables, preprocessing, and lumisection selections.
///
/// Architecture:
/// ```text
///  .parquet / .json / .csv
///        │
///        ▼
///   ┌──────────┐
///   │  loader   │  parse file → RawTable
///   └──────────┘
///        │
///        ▼
///   ┌──────────┐
///   │ prepare   │  per type: sort, crop, rebin, normalize → (N, ...) array
///   └──────────┘
///        │
///        ▼
///   ┌───────────┐
///   │ selection │  run/lumisection JSON → boolean mask
///   └───────────┘
/// ```

pub mod loader;
pub mod model;
pub mod prepare;
pub mod selection;
