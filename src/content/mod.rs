// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod allowlist;
mod embeds;
mod filters;
mod sanitize;
mod transform;
pub mod xhtml;

pub use allowlist::{AllowList, default_allowed_attributes, default_allowed_xhtml11_tags};
pub use embeds::{EmbedSettings, QUOTE_FORMATS, VIDEO_FORMATS, replace_embeds};
pub use filters::{choose_picture_sources, choose_video_sources, prepare_for_extraction};
pub use sanitize::{DefaultSanitizer, Sanitizer};
pub use transform::{ContentTransformer, IMAGE_PLACEHOLDER_ALT};
