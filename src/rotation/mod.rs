/*!
 * Key Rotation
 *
 * Re-encrypts every stored record from an old passphrase to a new one,
 * checkpointing progress after each record so a crash or cancellation
 * resumes instead of restarting. The rotation state file is the source
 * of truth: while it exists and reports in-progress, other vault
 * operations stand aside.
 */

mod rotation;


pub use rotation::RotationCoordinator;
pub use rotation::RotationMetadata;
pub use rotation::RotationOptions;
pub use rotation::RotationResult;
pub use rotation::RotationState;
pub use rotation::RotationStatus;
pub use rotation::ROTATION_DUE_AFTER_DAYS;
