pub mod gateway_relay;
