// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod fetch;
mod mime;
mod registry;

pub use fetch::{download_to_file, place_asset};
pub use mime::{ResolvedType, extension_for_media_type, resolve_type};
pub use registry::{MediaAsset, MediaKind, MediaLocator, MediaRegistry, Registration};

#[cfg(test)]
pub(crate) use fetch::tests::MockHttpClient;
