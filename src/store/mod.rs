/*!
 * Record Store
 *
 * The narrow persistence seam the security core consumes: opaque byte
 * blobs keyed by ID with atomic-replace semantics. `DirStore` is the
 * one-blob-per-record filesystem implementation.
 */

mod store;


pub use store::DirStore;
pub use store::RecordStore;
