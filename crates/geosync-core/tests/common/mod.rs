pub mod fake_site;
