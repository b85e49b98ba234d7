//! Pipelines behind the asset tasks.

use runnel_pipeline::{
    Autoprefix, BundleScripts, CompileStylesheets, Concat, Filter, Flatten, InitSourceMaps,
    MinifyCss, MinifyScripts, Pipeline, PrecompileTemplates, Rasterize, RenderViews, SvgSprite,
    WriteSourceMaps,
};
use serde::Serialize;

use crate::settings::Settings;

/// Variables every view can use.
#[derive(Debug, Serialize)]
struct ViewLocals {
    url: String,
    live: bool,
}

/// Pages rendered into the build root. Partials are only included, never
/// emitted.
pub fn views(settings: &Settings) -> Pipeline {
    let views = &settings.config.views;
    let locals = ViewLocals {
        url: settings.url(),
        live: settings.live(),
    };

    Pipeline::new("views", settings.source(&views.src).with_base(&views.base))
        .pipe(Filter::skip_partials())
        .pipe(RenderViews::new(settings.path(&views.base), locals))
        .dest(settings.path(&settings.config.build))
}

/// Client-side templates registered on one global object, next to the
/// scripts.
pub fn templates(settings: &Settings) -> Pipeline {
    let templates = &settings.config.templates;

    Pipeline::new(
        "templates",
        settings.source(&templates.src).with_base(&templates.base),
    )
    .pipe(PrecompileTemplates::new(&templates.out, &templates.variable))
    .dest(settings.path(&settings.config.scripts.dest))
}

pub fn images(settings: &Settings) -> Pipeline {
    let images = &settings.config.images;

    Pipeline::new("images", settings.source(&images.src)).dest(settings.path(&images.dest))
}

/// Icons merged into one `<symbol>` sprite, plus a PNG copy when a
/// rasterizer is configured.
pub fn sprites(settings: &Settings) -> Pipeline {
    let sprites = &settings.config.sprites;

    let pipeline = Pipeline::new("sprites", settings.source(&sprites.src))
        .pipe(SvgSprite::new(&sprites.out))
        .dest(settings.path(&sprites.dest));

    match sprites.rasterizer.as_deref() {
        Some([program, args @ ..]) => pipeline.pipe(Rasterize::new(program, args.to_vec())),
        _ => pipeline,
    }
}

/// Entry scripts bundled with their imports. The site URL and build mode
/// are compiled in as `process.env.url` and `process.env.live`.
pub fn project_scripts(settings: &Settings) -> Pipeline {
    let scripts = &settings.config.scripts;
    let production = settings.mode.is_production();

    let bundler = BundleScripts::new(&scripts.project.bundler)
        .define("url", settings.url())
        .define("live", settings.live().to_string())
        .minify(production)
        .source_maps(!production);

    Pipeline::new("scripts.project", settings.source(&scripts.project.src))
        .pipe(bundler)
        .pipe(Concat::new(&scripts.project.out))
        .dest(settings.path(&scripts.dest))
}

/// Third-party scripts joined into one file.
pub fn vendor_scripts(settings: &Settings) -> Pipeline {
    let scripts = &settings.config.scripts;
    let production = settings.mode.is_production();

    Pipeline::new("scripts.vendor", settings.source(&scripts.vendor.src))
        .pipe(Flatten)
        .when(!production, InitSourceMaps)
        .when(production, MinifyScripts)
        .pipe(Concat::new(&scripts.vendor.out))
        .when(!production, WriteSourceMaps)
        .dest(settings.path(&scripts.dest))
}

/// Project stylesheets compiled, prefixed for the configured browsers and
/// minified for production.
pub fn project_stylesheets(settings: &Settings) -> Pipeline {
    let styles = &settings.config.styles.project;
    let production = settings.mode.is_production();

    Pipeline::new("stylesheets.project", settings.source(&styles.src))
        .pipe(Filter::skip_partials())
        .when(!production, InitSourceMaps)
        .pipe(CompileStylesheets)
        .pipe(Autoprefix::new(&styles.browsers))
        .when(production, MinifyCss)
        .when(!production, WriteSourceMaps)
        .dest(settings.path(&styles.dest))
}

pub fn vendor_stylesheets(settings: &Settings) -> Pipeline {
    let styles = &settings.config.styles.vendor;

    Pipeline::new("stylesheets.vendor", settings.source(&styles.src))
        .dest(settings.path(&styles.dest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::env::Env;
    use crate::settings::BuildMode;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn settings(root: &Path, mode: BuildMode, env: &str) -> Settings {
        let env = Env::parse(Path::new(".env"), env).unwrap();
        Settings::new(root.to_path_buf(), Config::default(), env, mode, "build")
    }

    fn write(root: &Path, path: &str, contents: &str) {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn views_see_url_and_live() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(root, "views/_layout.html", "<title>{{ url }}</title>{% block body %}{% endblock %}");
        write(
            root,
            "views/about/index.html",
            "{% extends \"_layout.html\" %}{% block body %}{% if live %}live{% else %}dev{% endif %}{% endblock %}",
        );

        let settings = settings(root, BuildMode::Production, "url=https://example.com\n");
        let report = views(&settings).run().await.unwrap();

        assert!(report.failures.is_empty(), "{:?}", report.failures);
        assert_eq!(report.written, vec![root.join("build/about/index.html")]);
        let html = fs::read_to_string(root.join("build/about/index.html")).unwrap();
        assert_eq!(html, "<title>https://example.com</title>live");
    }

    #[tokio::test]
    async fn templates_land_next_to_scripts() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(root, "templates/cards/item.html", "<li>{{ name }}</li>");

        let settings = settings(root, BuildMode::Development, "");
        templates(&settings).run().await.unwrap();

        let js = fs::read_to_string(root.join("build/js/templates.js")).unwrap();
        assert!(js.starts_with("var templates = templates || {};"));
        assert!(js.contains("templates[\"cards/item.html\"]"));
    }

    #[tokio::test]
    async fn vendor_scripts_are_flattened_into_one_file() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(root, "assets/vendor/a/first.js", "var first = 1;\n");
        write(root, "assets/vendor/b/second.js", "var second = 2;\n");

        let settings = settings(root, BuildMode::Development, "");
        let report = vendor_scripts(&settings).run().await.unwrap();

        assert_eq!(report.written, vec![root.join("build/js/vendor.js")]);
        let js = fs::read_to_string(root.join("build/js/vendor.js")).unwrap();
        assert!(js.contains("var first = 1;"));
        assert!(js.contains("var second = 2;"));
        assert!(js.contains("//# sourceMappingURL="));
    }

    #[tokio::test]
    async fn images_and_vendor_stylesheets_are_copied() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(root, "assets/images/icons/logo.png", "png");
        write(root, "assets/vendor/grid.css", ".row{}");

        let settings = settings(root, BuildMode::Production, "");
        images(&settings).run().await.unwrap();
        vendor_stylesheets(&settings).run().await.unwrap();

        assert_eq!(
            fs::read_to_string(root.join("build/images/icons/logo.png")).unwrap(),
            "png"
        );
        assert_eq!(
            fs::read_to_string(root.join("build/css/vendor/grid.css")).unwrap(),
            ".row{}"
        );
    }

    #[tokio::test]
    async fn sprites_merge_icons() {
        let temp = tempdir().unwrap();
        let root = temp.path();
        write(
            root,
            "assets/sprites/close.svg",
            "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 10 10\"><path d=\"M0 0\"/></svg>",
        );

        let settings = settings(root, BuildMode::Production, "");
        let report = sprites(&settings).run().await.unwrap();

        assert_eq!(report.written, vec![root.join("build/images/sprite.svg")]);
        let svg = fs::read_to_string(root.join("build/images/sprite.svg")).unwrap();
        assert!(svg.contains("<symbol id=\"close\" viewBox=\"0 0 10 10\">"));
    }
}
