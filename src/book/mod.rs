// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod model;
mod options;
mod slug;

pub use model::{COVER_HREF, ContentItem, Cover, CustomTemplates, DocumentModel, TOC_HREF};
pub use options::{ContentSource, EpubOptions, EpubVersion};
pub use slug::{MAX_FILENAME_BYTES, output_filename, site_name_from_url, slug};
