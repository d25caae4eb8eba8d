use std::{fs, path::Path, str::FromStr, sync::Arc};

use anyhow::{anyhow, Context};
use axum::response::Html;
use bigdecimal::BigDecimal;
use handlebars::{handlebars_helper, RenderError};
use serde::Serialize;

const LAYOUT: &str = "base.layout.hbs";

#[derive(Clone)]
pub struct Template {
    r: Arc<handlebars::Handlebars<'static>>,
}

impl Template {
    /// Registers every `.hbs` file of `dir` under its file name.
    pub fn new(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref();
        let mut handlebars = handlebars::Handlebars::new();
        let entries =
            fs::read_dir(dir).with_context(|| format!("cannot open {}", dir.display()))?;
        for entity in entries {
            let entity = entity?;
            let file_name = entity.file_name();
            let name = file_name
                .to_str()
                .ok_or_else(|| anyhow!("template name is not utf-8: {:?}", file_name))?;
            if !name.ends_with(".hbs") {
                continue;
            }
            handlebars.register_template_file(name, entity.path())?;
        }

        if !handlebars.has_template(LAYOUT) {
            return Err(anyhow!("{} is missing from {}", LAYOUT, dir.display()));
        }

        handlebars_helper!(nor_amt: |i: String| BigDecimal::from_str(&i)
            .map(|d| crate::models::format_amount(&d))
            .unwrap_or(i));
        handlebars_helper!(ymd: |i: String| i.chars().take(10).collect::<String>());

        handlebars.register_helper("nor_amt", Box::new(nor_amt));
        handlebars.register_helper("ymd", Box::new(ymd));
        Ok(Self {
            r: Arc::new(handlebars),
        })
    }

    /// Renders `name` and wraps the result in the page layout.
    pub fn render<T>(&self, name: &str, data: &T) -> Result<Html<String>, RenderError>
    where
        T: Serialize,
    {
        #[derive(Serialize)]
        struct Layout {
            body: String,
        }

        log::trace!("render '{}': {:?}", name, serde_json::to_value(data));
        let body = self.r.render(name, data)?;
        let page = self.r.render(LAYOUT, &Layout { body })?;
        Ok(Html(page))
    }
}
