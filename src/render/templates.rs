// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Built-in templates and `{{key}}` substitution
//!
//! Custom templates use the same keys as the built-in ones. Values are
//! inserted verbatim; callers escape them.

use std::path::Path;

use crate::book::{CustomTemplates, EpubVersion};
use crate::error::BuildError;

pub const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" ?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

pub const IBOOKS_DISPLAY_OPTIONS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<display_options>
  <platform name="*">
    <option name="specified-fonts">true</option>
  </platform>
</display_options>
"#;

pub const DEFAULT_CSS: &str = r#".epub-author {
  color: #555;
}

.epub-link {
  margin-bottom: 30px;
}

.epub-link a {
  color: #666;
  font-size: 90%;
}

.toc-author {
  font-size: 90%;
  color: #555;
}

.toc-link {
  color: #999;
  font-size: 85%;
  display: block;
}

hr {
  border: 0;
  border-bottom: 1px solid #dedede;
  margin: 60px 10%;
}

img, video, audio {
  max-width: 100%;
}

figure {
  margin: 1em 0;
}

figcaption {
  font-size: 90%;
  color: #555;
}
"#;

/// XML declaration, doctype and opening `html` tag of every XHTML file
pub fn document_header(version: EpubVersion, lang: &str) -> String {
    match version {
        EpubVersion::V2 => format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">
<html xmlns="http://www.w3.org/1999/xhtml" xml:lang="{lang}">"#
        ),
        EpubVersion::V3 => format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="{lang}" xml:lang="{lang}">"#
        ),
    }
}

const CONTENT: &str = r#"{{header}}
<head>
<title>{{title}}</title>
<link rel="stylesheet" type="text/css" href="style.css" />
</head>
<body>
{{heading}}{{body}}
</body>
</html>
"#;

const COVER_V2: &str = r#"{{header}}
<head>
<title>{{title}}</title>
<style type="text/css">
body { margin: 0; padding: 0; text-align: center; }
.cover { margin: 0; padding: 0; }
img { max-width: 100%; max-height: 100%; }
</style>
</head>
<body>
<div class="cover"><img src="{{cover_file}}" alt="{{title}}" width="{{width}}" height="{{height}}" /></div>
</body>
</html>
"#;

const COVER_V3: &str = r#"{{header}}
<head>
<title>{{title}}</title>
<style>
body { margin: 0; padding: 0; text-align: center; }
.cover { margin: 0; padding: 0; height: 100vh; }
svg { margin: 0; padding: 0; }
</style>
</head>
<body epub:type="cover">
<div class="cover"><svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" version="1.1" width="100%" height="100%" viewBox="0 0 {{width}} {{height}}" preserveAspectRatio="xMidYMid meet"><image width="{{width}}" height="{{height}}" xlink:href="{{cover_file}}" /></svg></div>
</body>
</html>
"#;

const HTML_TOC_V2: &str = r#"{{header}}
<head>
<title>{{toc_title}}</title>
<link rel="stylesheet" type="text/css" href="style.css" />
</head>
<body>
<h1 class="h1">{{toc_title}}</h1>
{{entries}}
</body>
</html>
"#;

const HTML_TOC_V3: &str = r#"{{header}}
<head>
<title>{{toc_title}}</title>
<link rel="stylesheet" type="text/css" href="style.css" />
</head>
<body>
<h1 class="h1">{{toc_title}}</h1>
<nav id="toc" epub:type="toc" class="TOC">
<ol>
{{entries}}
</ol>
</nav>
{{landmarks}}
</body>
</html>
"#;

const NCX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
<head>
<meta name="dtb:uid" content="{{id}}" />
<meta name="dtb:generator" content="epub-downloader" />
<meta name="dtb:depth" content="1" />
<meta name="dtb:totalPageCount" content="0" />
<meta name="dtb:maxPageNumber" content="0" />
</head>
<docTitle><text>{{title}}</text></docTitle>
<docAuthor><text>{{author}}</text></docAuthor>
<navMap>
{{nav_points}}
</navMap>
</ncx>
"#;

const OPF_V2: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0" unique-identifier="BookId">
<metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
<dc:identifier id="BookId" opf:scheme="UUID">{{id}}</dc:identifier>
<dc:title>{{title}}</dc:title>
<dc:language>{{lang}}</dc:language>
<dc:date>{{date}}</dc:date>
{{creators}}
<dc:publisher>{{publisher}}</dc:publisher>
{{description}}
{{cover_meta}}
</metadata>
<manifest>
{{manifest}}
</manifest>
<spine toc="ncx">
{{spine}}
</spine>
<guide>
{{guide}}
</guide>
</package>
"#;

const OPF_V3: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="BookId" xml:lang="{{lang}}">
<metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
<dc:identifier id="BookId">urn:uuid:{{id}}</dc:identifier>
<dc:title>{{title}}</dc:title>
<dc:language>{{lang}}</dc:language>
<dc:date>{{date}}</dc:date>
{{creators}}
<dc:publisher>{{publisher}}</dc:publisher>
{{description}}
<meta property="dcterms:modified">{{modified}}</meta>
{{cover_meta}}
</metadata>
<manifest>
{{manifest}}
</manifest>
<spine>
{{spine}}
</spine>
<guide>
{{guide}}
</guide>
</package>
"#;

/// Template texts used for one build
#[derive(Debug, Clone)]
pub struct Templates {
    pub content: String,
    pub cover: String,
    pub html_toc: String,
    pub ncx: String,
    pub opf: String,
}

impl Templates {
    /// Built-in templates for `version` with configured overrides read from disk
    pub fn load(version: EpubVersion, custom: &CustomTemplates) -> Result<Self, BuildError> {
        let (cover, html_toc, opf) = match version {
            EpubVersion::V2 => (COVER_V2, HTML_TOC_V2, OPF_V2),
            EpubVersion::V3 => (COVER_V3, HTML_TOC_V3, OPF_V3),
        };

        Ok(Self {
            content: CONTENT.to_string(),
            cover: read_or(custom.html_cover.as_deref(), cover)?,
            html_toc: read_or(custom.html_toc.as_deref(), html_toc)?,
            ncx: read_or(custom.ncx.as_deref(), NCX)?,
            opf: read_or(custom.opf.as_deref(), opf)?,
        })
    }
}

fn read_or(path: Option<&Path>, built_in: &str) -> Result<String, BuildError> {
    let Some(path) = path else {
        return Ok(built_in.to_string());
    };
    if !path.is_file() {
        return Err(BuildError::MissingTemplate {
            path: path.to_path_buf(),
        });
    }
    std::fs::read_to_string(path).map_err(|e| BuildError::TemplateReadFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Replace every `{{key}}` with its value; unknown keys stay as they are
pub fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let key = after[..end].trim();
        match values.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}
