/// Pages the shell can mount once the asset vault is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Home,
    Team,
    Services,
    Industries,
    Blog,
    BlogPost(u32),
}

impl Route {
    pub const NAV: &'static [Route] = &[
        Route::Home,
        Route::Team,
        Route::Services,
        Route::Industries,
        Route::Blog,
    ];

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Team => "/team".to_string(),
            Route::Services => "/services".to_string(),
            Route::Industries => "/industries".to_string(),
            Route::Blog => "/blog".to_string(),
            Route::BlogPost(id) => format!("/blog/{id}"),
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        let trimmed = path.trim_end_matches('/');
        match trimmed {
            "" => Some(Route::Home),
            "/team" => Some(Route::Team),
            "/services" => Some(Route::Services),
            "/industries" => Some(Route::Industries),
            "/blog" => Some(Route::Blog),
            other => other
                .strip_prefix("/blog/")
                .and_then(|id| id.parse().ok())
                .map(Route::BlogPost),
        }
    }

    /// Page to open at launch: the path given on the command line, or home
    /// when it is missing or unknown.
    pub fn initial(arg: Option<&str>) -> Self {
        arg.and_then(Self::from_path).unwrap_or(Route::Home)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Route::Home => "Home",
            Route::Team => "Team",
            Route::Services => "Services",
            Route::Industries => "Industries",
            Route::Blog | Route::BlogPost(_) => "Insights",
        }
    }
}
