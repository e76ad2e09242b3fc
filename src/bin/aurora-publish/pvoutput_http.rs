use std::time::Duration;

use aurora_bridge::error::PublishError;
use aurora_bridge::pvoutput::FormPoster;
use reqwest::blocking::Client;

pub struct HttpPoster {
    client: Client,
}

impl HttpPoster {
    pub fn new() -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { client })
    }
}

impl FormPoster for HttpPoster {
    fn post_form(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<u16, PublishError> {
        let mut request = self.client.post(url).body(body.to_string());
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        let response = request
            .send()
            .map_err(|e| PublishError::Transport(e.to_string()))?;
        Ok(response.status().as_u16())
    }
}
