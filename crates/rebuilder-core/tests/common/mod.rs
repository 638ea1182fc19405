pub mod aria2_server;
